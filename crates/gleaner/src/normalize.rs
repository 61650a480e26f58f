//! Feed entry normalization, deduplication and store upsert.
//!
//! The same paper routinely matches several searches, and reappears on every run while it is
//! inside the window. [`normalize`] collapses duplicates within a run; [`upsert`] relies on the
//! store's insert-or-ignore to collapse them across runs.

use super::*;
use crate::{
  database::Add,
  feed::{FeedPage, RawEntry},
  item::{canonical_id, parse_published},
};

/// Converts an entry into a freshly discovered record.
pub fn to_record(entry: &RawEntry) -> Result<ItemRecord> {
  let id = canonical_id(&entry.id)?;
  let published = parse_published(&entry.published)?;
  Ok(ItemRecord::discovered(id, &entry.title, published).with_abstract(&entry.summary))
}

/// Normalizes every entry of every page, dropping duplicates by id.
///
/// The first occurrence of an id wins and output order follows first appearance. Entries whose
/// identifier or timestamp cannot be derived are skipped with a warning.
pub fn normalize(pages: &[FeedPage]) -> Vec<ItemRecord> {
  let mut seen = HashSet::new();
  let mut records = Vec::new();

  for entry in pages.iter().flat_map(|page| &page.entries) {
    let record = match to_record(entry) {
      Ok(record) => record,
      Err(e) => {
        warn!("Skipping feed entry {:?}: {e}", entry.id);
        continue;
      },
    };
    if seen.insert(record.id.clone()) {
      records.push(record);
    } else {
      trace!("Duplicate entry {}", record.id);
    }
  }

  debug!("Normalized {} unique record(s)", records.len());
  records
}

/// Inserts records not yet in the store, leaving existing ones untouched.
///
/// Returns how many records were new.
pub async fn upsert(db: &mut Database, records: &[ItemRecord]) -> Result<usize> {
  if records.is_empty() {
    return Ok(0);
  }
  let inserted = Add::items(records).execute(db).await?;
  info!("Discovered {inserted} new record(s) out of {}", records.len());
  Ok(inserted)
}
