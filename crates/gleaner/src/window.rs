//! The trailing recency window.
//!
//! Window membership is recomputed from `published` on every run and never stored. Comparisons in
//! Rust use [`DateTime<Utc>`]; only store queries see the boundary as a string.

use chrono::SubsecRound;

use super::*;
use crate::item::to_store_timestamp;

/// Longest window configuration accepts.
pub const MAX_WINDOW_DAYS: u32 = 36_500;

/// Items published at or after `start` are in the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
  start: DateTime<Utc>,
}

impl Window {
  /// The `days` days leading up to `now`.
  ///
  /// The start is truncated to whole seconds, the resolution of stored timestamps, so in-memory
  /// and store comparisons agree. A span reaching past the earliest representable time starts
  /// there instead.
  pub fn trailing_days(now: DateTime<Utc>, days: u32) -> Self {
    let start = now
      .checked_sub_signed(TimeDelta::days(i64::from(days)))
      .unwrap_or(DateTime::<Utc>::MIN_UTC);
    Self { start: start.trunc_subsecs(0) }
  }

  /// Inclusive lower bound.
  pub fn start(&self) -> DateTime<Utc> { self.start }

  /// Lower bound rendered in the store's timestamp layout.
  pub fn store_boundary(&self) -> String { to_store_timestamp(&self.start) }

  /// Whether `published` falls inside the window.
  pub fn contains(&self, published: &DateTime<Utc>) -> bool { *published >= self.start }
}

/// Records inside `window` whose payload is not yet in `paper_dir`, in input order.
pub fn pending<'a>(
  records: &'a [ItemRecord],
  window: &Window,
  paper_dir: &Path,
) -> Vec<&'a ItemRecord> {
  records
    .iter()
    .filter(|record| window.contains(&record.published))
    .filter(|record| {
      let present = record.payload_path(paper_dir).is_file();
      if present {
        trace!("Payload for {} already present", record.id);
      }
      !present
    })
    .collect()
}
