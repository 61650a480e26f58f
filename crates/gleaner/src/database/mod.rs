//! The lifecycle store: one SQLite row per discovered paper.
//!
//! Operations are expressed as instructions implementing [`DatabaseInstruction`]:
//!
//! - [`Add`]: insert-or-ignore, so rediscovering a paper never touches its state
//! - [`Query`]: lookups by id and the window-scoped filters the stages need
//! - [`Update`]: one-directional status transitions
//!
//! Every instruction is a single statement or a single transaction over one batch; there is no
//! locking across instructions. Overlapping runs are kept apart by
//! [`RunLock`](crate::pipeline::RunLock) instead.
//!
//! # Examples
//!
//! ```no_run
//! use chrono::Utc;
//! use gleaner::{
//!   database::{Add, Database, Query, Update},
//!   item::ItemRecord,
//!   prelude::*,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut db = Database::open("gleaner.db").await?;
//! let record = ItemRecord::discovered("2401.01234v1", "A Paper", Utc::now());
//!
//! assert!(Add::item(&record).execute(&mut db).await?);
//! assert!(!Add::item(&record).execute(&mut db).await?); // already known
//! Update::downloaded(&record.id).execute(&mut db).await?;
//!
//! let stored = Query::by_id(&record.id).execute(&mut db).await?;
//! assert!(stored[0].downloaded);
//! # Ok(())
//! # }
//! ```

use rusqlite::{params, params_from_iter, Row};
use tokio_rusqlite::Connection;

use super::*;
use crate::item::{from_store_timestamp, to_store_timestamp};

pub mod instruction;

pub use self::instruction::{add::Add, query::Query, update::Update, *};

/// Handle to the lifecycle store.
pub struct Database {
  /// Async SQLite connection handle
  conn: Connection,
}

impl Database {
  /// Opens an existing store or creates a new one at the specified path.
  ///
  /// Parent directories are created and the schema is applied idempotently, so opening the same
  /// file repeatedly is safe.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      tokio::fs::create_dir_all(parent).await?;
    }
    let conn = Connection::open(path).await?;

    conn
      .call(|conn| {
        conn.execute_batch(include_str!(concat!(
          env!("CARGO_MANIFEST_DIR"),
          "/migrations/init.sql"
        )))?;
        Ok(())
      })
      .await?;

    debug!("Opened lifecycle store at {}", path.display());
    Ok(Self { conn })
  }

  /// Opens a throwaway in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory().await?;
    conn
      .call(|conn| {
        conn.execute_batch(include_str!(concat!(
          env!("CARGO_MANIFEST_DIR"),
          "/migrations/init.sql"
        )))?;
        Ok(())
      })
      .await?;
    Ok(Self { conn })
  }

  /// Returns the default path for the store.
  ///
  /// - On Unix: `~/.local/share/gleaner/gleaner.db`
  /// - On macOS: `~/Library/Application Support/gleaner/gleaner.db`
  /// - On Windows: `%APPDATA%\gleaner\gleaner.db`
  /// - Fallback: `./gleaner/gleaner.db`
  pub fn default_path() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("gleaner").join("gleaner.db")
  }
}

/// Column list shared by every read.
pub(crate) const ITEM_COLUMNS: &str =
  "id, url, title, published, downloaded, summarized, shared, findings, one_liner, abstract_text";

/// Maps a row selected with [`ITEM_COLUMNS`] to an [`ItemRecord`].
pub(crate) fn item_from_row(row: &Row<'_>) -> rusqlite::Result<ItemRecord> {
  let published: String = row.get(3)?;
  let findings: Option<String> = row.get(7)?;
  Ok(ItemRecord {
    id:            row.get(0)?,
    url:           row.get(1)?,
    title:         row.get(2)?,
    published:     from_store_timestamp(&published).map_err(|e| {
      conversion_failure(3, std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    })?,
    downloaded:    row.get(4)?,
    summarized:    row.get(5)?,
    shared:        row.get(6)?,
    findings:      match findings {
      Some(raw) => serde_json::from_str(&raw).map_err(|e| conversion_failure(7, e))?,
      None => Vec::new(),
    },
    one_liner:     row.get(8)?,
    abstract_text: row.get(9)?,
  })
}

fn conversion_failure(
  column: usize,
  error: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
  rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(error))
}
