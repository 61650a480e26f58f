//! Database instructions for the lifecycle store.
//!
//! Each instruction type owns the data it needs, builds its SQL, and runs on the store's
//! connection thread through [`DatabaseInstruction::execute`].

use super::*;

pub mod add;
pub mod query;
pub mod update;

/// An operation that can be executed against a [`Database`].
#[async_trait]
pub trait DatabaseInstruction {
  /// What the instruction produces.
  type Output;

  /// Runs the instruction.
  ///
  /// Takes `&mut Database` so several instructions can run in sequence on one handle.
  async fn execute(&self, db: &mut Database) -> Result<Self::Output>;
}
