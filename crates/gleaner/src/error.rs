//! Error types for the gleaner library.
//!
//! Every fallible operation in the crate returns [`GleanerError`]. Stages decide per variant
//! whether an error is local to one item (logged and skipped) or fatal to the run:
//! - Network, status and parse failures are item-local
//! - Store and configuration failures propagate to the caller
//!
//! # Examples
//!
//! ```
//! use gleaner::{error::GleanerError, item::canonical_id};
//!
//! match canonical_id("http://arxiv.org/api/errors#incorrect_id_format") {
//!   Err(GleanerError::InvalidIdentifier(raw)) => println!("not a paper: {raw}"),
//!   Err(e) => println!("other error: {e}"),
//!   Ok(id) => println!("paper {id}"),
//! }
//! ```

use std::path::PathBuf;

use thiserror::Error;

/// Error type alias used for the [`gleaner`](crate) crate.
pub type Result<T> = core::result::Result<T, GleanerError>;

/// Errors that can occur while running the pipeline.
#[derive(Error, Debug)]
pub enum GleanerError {
  /// The entry or payload URL does not carry a recognizable paper identifier.
  ///
  /// arXiv reports API errors as feed entries whose id points at `/api/errors`, and those end up
  /// here.
  #[error("Invalid identifier: {0}")]
  InvalidIdentifier(String),

  /// A timestamp could not be parsed from the feed or the store.
  #[error("Invalid timestamp: {0}")]
  Timestamp(String),

  /// A network request failed before a response was received.
  ///
  /// This covers connection failures, TLS errors and the fixed per-request timeout.
  #[error(transparent)]
  Network(#[from] reqwest::Error),

  /// A request completed with a non-success status code.
  #[error("{url} responded with status {status}")]
  Status {
    /// The requested URL
    url:    String,
    /// The HTTP status code returned
    status: u16,
  },

  /// A search result page was not a usable Atom/OpenSearch document.
  #[error("Malformed feed: {0}")]
  Feed(String),

  /// Low-level XML parsing failure.
  #[error(transparent)]
  Xml(#[from] quick_xml::Error),

  /// A URL could not be parsed.
  #[error(transparent)]
  Url(#[from] url::ParseError),

  /// A SQLite operation failed.
  #[error(transparent)]
  Sqlite(#[from] rusqlite::Error),

  /// An async SQLite operation failed.
  #[error(transparent)]
  AsyncSqlite(#[from] tokio_rusqlite::Error),

  /// A file system operation failed.
  #[error(transparent)]
  Path(#[from] std::io::Error),

  /// JSON (de)serialization failed.
  #[error(transparent)]
  Json(#[from] serde_json::Error),

  /// PDF parsing errors from the lopdf library.
  ///
  /// Common causes are truncated downloads, HTML error pages saved as PDFs and encrypted files.
  #[error(transparent)]
  Lopdf(#[from] lopdf::Error),

  /// A document parsed but yielded no usable text.
  #[error("Text extraction failed: {0}")]
  Extraction(String),

  /// The summarizer replied with something that is not a valid summary.
  ///
  /// Raised when the reply is not JSON, or when `findings` or `one_liner` is missing or empty.
  #[error("Invalid summary: {0}")]
  Summary(String),

  /// A model was not specified for the LLM request.
  #[error("No model was chosen for the LLM.")]
  LLMMissingModel,

  /// No messages were provided in the LLM request.
  #[error("No messages were supplied to send to the LLM.")]
  LLMMissingMessage,

  /// A digest message could not be delivered.
  #[error("Delivery to {recipient} failed: {reason}")]
  Delivery {
    /// Address the message was meant for
    recipient: String,
    /// Why delivery failed
    reason:    String,
  },

  /// Another run currently holds the pipeline lock.
  #[error("Another run holds the lock at {}", .0.display())]
  AlreadyRunning(PathBuf),

  /// The configuration file could not be deserialized.
  #[error(transparent)]
  TomlDe(#[from] toml::de::Error),

  /// Configuration or credentials are missing or inconsistent.
  #[error("{0}")]
  Config(String),
}
