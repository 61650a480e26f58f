//! Insert-or-ignore of newly discovered items.
//!
//! Discovery is idempotent: adding a record whose `id` is already stored is a no-op and leaves the
//! stored row, including its status flags, exactly as it was.

use super::*;

/// Instruction inserting records that are not yet in the store.
pub struct Add {
  /// Records to insert, in order
  records: Vec<ItemRecord>,
}

impl Add {
  /// Adds a single record.
  pub fn item(record: &ItemRecord) -> Single { Single(Self { records: vec![record.clone()] }) }

  /// Adds a batch of records in one transaction.
  pub fn items(records: &[ItemRecord]) -> Self { Self { records: records.to_vec() } }
}

/// [`Add`] for one record, reporting whether it was new.
pub struct Single(Add);

#[async_trait]
impl DatabaseInstruction for Add {
  /// Number of records that were actually inserted.
  type Output = usize;

  async fn execute(&self, db: &mut Database) -> Result<Self::Output> {
    let records = self.records.clone();
    let first_seen = to_store_timestamp(&Utc::now());

    let inserted = db
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
          let mut stmt = tx.prepare_cached(
            "INSERT OR IGNORE INTO items (
                id, url, title, abstract_text, published, downloaded, summarized, shared,
                first_seen
             ) VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, 0, ?6)",
          )?;

          for record in &records {
            inserted += stmt.execute(params![
              record.id,
              record.url,
              record.title,
              record.abstract_text,
              to_store_timestamp(&record.published),
              first_seen,
            ])?;
          }
        }
        tx.commit()?;
        Ok(inserted)
      })
      .await?;

    trace!("Inserted {inserted} of {} record(s)", self.records.len());
    Ok(inserted)
  }
}

#[async_trait]
impl DatabaseInstruction for Single {
  /// `true` when the record was new.
  type Output = bool;

  async fn execute(&self, db: &mut Database) -> Result<Self::Output> {
    Ok(self.0.execute(db).await? == 1)
  }
}
