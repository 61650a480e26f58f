//! One-directional status transitions.
//!
//! Every update only ever sets a flag. The `WHERE` clauses make each transition a no-op when its
//! precondition does not hold, so updates are safe to repeat and never regress a record.

use super::*;
use crate::llm::Summary;

/// The status change an [`Update`] applies.
#[derive(Debug, Clone)]
enum Transition {
  Downloaded,
  Summarized(Summary),
  Shared,
}

/// Instruction moving one item forward in its lifecycle.
#[derive(Debug, Clone)]
pub struct Update {
  id:         String,
  transition: Transition,
}

impl Update {
  /// Marks the payload as persisted.
  pub fn downloaded(id: &str) -> Self { Self { id: id.to_string(), transition: Transition::Downloaded } }

  /// Records findings and synopsis and marks the item summarized.
  ///
  /// Refused with [`GleanerError::Summary`] when the summary is empty; an item that already has a
  /// summary keeps it.
  pub fn summarized(id: &str, summary: &Summary) -> Self {
    Self { id: id.to_string(), transition: Transition::Summarized(summary.clone()) }
  }

  /// Marks a summarized item as included in a dispatched digest.
  pub fn shared(id: &str) -> Self { Self { id: id.to_string(), transition: Transition::Shared } }
}

#[async_trait]
impl DatabaseInstruction for Update {
  /// `true` when the row changed.
  type Output = bool;

  async fn execute(&self, db: &mut Database) -> Result<Self::Output> {
    let id = self.id.clone();

    let changed = match &self.transition {
      Transition::Downloaded =>
        db.conn
          .call(move |conn| {
            Ok(conn.execute("UPDATE items SET downloaded = 1 WHERE id = ?1 AND downloaded = 0", [
              id,
            ])?)
          })
          .await?,
      Transition::Summarized(summary) => {
        summary.validate()?;
        let findings = serde_json::to_string(&summary.findings)?;
        let one_liner = summary.one_liner.clone();
        db.conn
          .call(move |conn| {
            Ok(conn.execute(
              "UPDATE items SET summarized = 1, findings = ?2, one_liner = ?3
               WHERE id = ?1 AND summarized = 0",
              params![id, findings, one_liner],
            )?)
          })
          .await?
      },
      Transition::Shared =>
        db.conn
          .call(move |conn| {
            Ok(conn.execute(
              "UPDATE items SET shared = 1 WHERE id = ?1 AND summarized = 1 AND shared = 0",
              [id],
            )?)
          })
          .await?,
    };

    trace!("Update {:?} on {} changed {changed} row(s)", self.transition, self.id);
    Ok(changed == 1)
  }
}
