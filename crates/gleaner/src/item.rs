//! The item record tracked through the pipeline and its identifier derivations.
//!
//! Identifiers are derived from arXiv URLs. An entry id such as
//! `http://arxiv.org/abs/2401.01234v1` yields the canonical id `2401.01234v1`; the payload
//! location and the on-disk file name are both derived from that id, so the same paper always maps
//! to the same row and the same file.
//!
//! # Examples
//!
//! ```
//! use gleaner::item::{canonical_id, id_from_payload_url, payload_file_name, payload_url};
//!
//! let id = canonical_id("http://arxiv.org/abs/2401.01234v1").unwrap();
//! assert_eq!(id, "2401.01234v1");
//! assert_eq!(payload_url(&id), "https://arxiv.org/pdf/2401.01234v1.pdf");
//! assert_eq!(id_from_payload_url(&payload_url(&id)).as_deref(), Some("2401.01234v1"));
//! assert_eq!(payload_file_name(&id), "2401.01234v1.pdf");
//! ```

use super::*;

/// Fixed-width timestamp layout used at the store boundary.
///
/// Stored timestamps are compared lexically by SQLite, which is only correct because this format
/// is zero-padded and always UTC. All writes go through [`to_store_timestamp`].
pub const STORE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Base location payloads are requested from.
pub const PAYLOAD_BASE_URL: &str = "https://arxiv.org/pdf/";

/// Extension appended to every persisted payload.
pub const PAYLOAD_EXTENSION: &str = "pdf";

lazy_static! {
  /// Captures the identifier that follows `/abs/` in an entry id.
  static ref ABS_ID: Regex = Regex::new(r"/abs/(?P<id>[^?#\s]+?)/?$").unwrap();
  /// Captures the identifier that follows `/pdf/` in a payload URL, without the extension.
  static ref PDF_ID: Regex = Regex::new(r"/pdf/(?P<id>[^?#\s]+?)(?:\.pdf)?/?(?:[?#].*)?$").unwrap();
}

/// One discovered paper and its lifecycle state.
///
/// Status flags are monotonic: the store only ever sets them, never clears them. `findings` and
/// `one_liner` are populated together with `summarized`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
  /// Canonical identifier, stable across runs
  pub id:            String,
  /// Payload location derived from `id`
  pub url:           String,
  /// Whitespace-collapsed title
  pub title:         String,
  /// Publication timestamp in UTC
  pub published:     DateTime<Utc>,
  /// Payload has been persisted locally
  pub downloaded:    bool,
  /// Findings and synopsis have been produced
  pub summarized:    bool,
  /// Included in a dispatched digest
  pub shared:        bool,
  /// Short fact strings, empty until summarized
  pub findings:      Vec<String>,
  /// One-sentence synopsis, present once summarized
  pub one_liner:     Option<String>,
  /// Whitespace-collapsed abstract from the feed, empty when the entry had none
  #[serde(default)]
  pub abstract_text: String,
}

impl ItemRecord {
  /// Builds a freshly discovered record with all status flags cleared.
  pub fn discovered(id: impl Into<String>, title: &str, published: DateTime<Utc>) -> Self {
    let id = id.into();
    Self {
      url: payload_url(&id),
      id,
      title: collapse_whitespace(title),
      published,
      downloaded: false,
      summarized: false,
      shared: false,
      findings: Vec::new(),
      one_liner: None,
      abstract_text: String::new(),
    }
  }

  /// Attaches the feed abstract.
  pub fn with_abstract(mut self, text: &str) -> Self {
    self.abstract_text = collapse_whitespace(text);
    self
  }

  /// Name of the payload file for this record.
  pub fn file_name(&self) -> String { payload_file_name(&self.id) }

  /// Full path of the payload file inside `paper_dir`.
  pub fn payload_path(&self, paper_dir: &Path) -> PathBuf { paper_dir.join(self.file_name()) }
}

impl Display for ItemRecord {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} ({}) {}", self.id, to_store_timestamp(&self.published), self.title)
  }
}

/// Extracts the canonical identifier from an entry id such as `http://arxiv.org/abs/2401.01234v1`.
pub fn canonical_id(entry_id: &str) -> Result<String> {
  ABS_ID
    .captures(entry_id.trim())
    .and_then(|caps| caps.name("id"))
    .map(|id| id.as_str().to_string())
    .ok_or_else(|| GleanerError::InvalidIdentifier(entry_id.to_string()))
}

/// Payload URL for an identifier.
pub fn payload_url(id: &str) -> String { format!("{PAYLOAD_BASE_URL}{id}.{PAYLOAD_EXTENSION}") }

/// Recovers the identifier from a payload URL, tolerating a missing `.pdf` suffix.
pub fn id_from_payload_url(url: &str) -> Option<String> {
  PDF_ID.captures(url.trim()).and_then(|caps| caps.name("id")).map(|id| id.as_str().to_string())
}

/// File name a payload is stored under. Old-style identifiers contain `/`, which is replaced.
pub fn payload_file_name(id: &str) -> String { format!("{}.{PAYLOAD_EXTENSION}", id.replace('/', "_")) }

/// Parses a feed timestamp into UTC.
///
/// Accepts RFC 3339 (what the feed carries, any offset) and the store layout.
pub fn parse_published(raw: &str) -> Result<DateTime<Utc>> {
  let raw = raw.trim();
  if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
    return Ok(parsed.with_timezone(&Utc));
  }
  from_store_timestamp(raw)
}

/// Renders a timestamp in the fixed-width store layout.
pub fn to_store_timestamp(timestamp: &DateTime<Utc>) -> String {
  timestamp.format(STORE_TIMESTAMP_FORMAT).to_string()
}

/// Parses a timestamp written by [`to_store_timestamp`].
pub fn from_store_timestamp(raw: &str) -> Result<DateTime<Utc>> {
  NaiveDateTime::parse_from_str(raw.trim(), STORE_TIMESTAMP_FORMAT)
    .map(|naive| naive.and_utc())
    .map_err(|e| GleanerError::Timestamp(format!("{raw}: {e}")))
}

/// Collapses runs of whitespace (feed titles wrap across lines) into single spaces.
pub fn collapse_whitespace(text: &str) -> String { text.split_whitespace().collect::<Vec<_>>().join(" ") }
