//! Run configuration and credentials.
//!
//! A [`Config`] is read once from TOML at process start and handed to each stage by reference.
//! Secrets never live in the file: [`Credentials::from_env`] pulls them from the environment (and
//! an optional `.env` file) and refuses to continue when a configured feature lacks its secret, so
//! a misconfigured run fails before any network activity.
//!
//! # Example
//!
//! ```toml
//! window_days = 7
//! page_size = 200
//! paper_dir = "papers"
//! database_path = "gleaner.db"
//!
//! [[searches]]
//! query = 'all:"prompt%20injection"+AND+cat:cs.*'
//!
//! [llm]
//! model = "llama3.2:3b"
//!
//! [digest]
//! subject = "GAI Security News"
//! sender = "digest@example.com"
//! recipients = ["reader@example.com"]
//! endpoint = "https://mail.example.com/v1/send"
//! ```

use super::*;
use crate::{digest::SharePolicy, llm::DEFAULT_INSTRUCTION};

/// Environment variable holding extra comma-separated digest recipients.
pub const RECIPIENTS_ENV: &str = "GLEANER_RECIPIENTS";

/// Complete configuration for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Search endpoint queried for result pages
  pub base_url:             String,
  /// Results requested per page, also the pagination step
  pub page_size:            usize,
  /// Optional cap on results collected per query
  pub result_cap:           Option<usize>,
  /// Size of the trailing recency window in days
  pub window_days:          u32,
  /// Directory payloads are persisted in
  pub paper_dir:            PathBuf,
  /// SQLite file backing the lifecycle store
  pub database_path:        PathBuf,
  /// Lock file guarding against overlapping runs, defaults next to the database
  pub lock_path:            Option<PathBuf>,
  /// Maximum payload downloads in flight
  pub fetch_concurrency:    usize,
  /// Fixed timeout applied to every HTTP request
  pub request_timeout_secs: u64,
  /// User agent sent with every HTTP request
  pub user_agent:           String,
  /// Search queries to collect
  pub searches:             Vec<collector::SearchQuery>,
  /// Summarize stage settings
  pub summary:              SummaryConfig,
  /// Language model settings
  pub llm:                  LlmConfig,
  /// Digest stage settings
  pub digest:               DigestConfig,
}

/// Settings for the summarize stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
  /// Compress extracted text before summarizing
  pub compress:         bool,
  /// Fraction of tokens the compressor keeps
  pub compression_rate: f32,
  /// Instruction sent alongside every document
  pub instruction:      String,
}

/// Settings for the Ollama summarizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
  /// Base URL of the Ollama service
  pub host:  String,
  /// Model name as known to Ollama
  pub model: String,
}

/// Settings for the digest stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
  /// Subject line, prefixed with the run date
  pub subject:      String,
  /// Sender address
  pub sender:       String,
  /// Recipient addresses
  pub recipients:   Vec<String>,
  /// Mail relay endpoint; without one digests are only logged
  pub endpoint:     Option<String>,
  /// Environment variable holding the relay token
  pub token_env:    String,
  /// Whether already shared items are included again
  pub share_policy: SharePolicy,
  /// Most records per digest; above it the model ranks them by importance
  pub top_n:        Option<usize>,
}

impl Default for Config {
  fn default() -> Self {
    let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("gleaner");
    Self {
      base_url:             "https://export.arxiv.org/api/query".to_string(),
      page_size:            200,
      result_cap:           None,
      window_days:          7,
      paper_dir:            data_dir.join("papers"),
      database_path:        data_dir.join("gleaner.db"),
      lock_path:            None,
      fetch_concurrency:    8,
      request_timeout_secs: 20,
      user_agent:           concat!("gleaner/", env!("CARGO_PKG_VERSION")).to_string(),
      searches:             Vec::new(),
      summary:              SummaryConfig::default(),
      llm:                  LlmConfig::default(),
      digest:               DigestConfig::default(),
    }
  }
}

impl Default for SummaryConfig {
  fn default() -> Self {
    Self { compress: true, compression_rate: 0.33, instruction: DEFAULT_INSTRUCTION.to_string() }
  }
}

impl Default for LlmConfig {
  fn default() -> Self {
    Self { host: "http://localhost:11434".to_string(), model: "llama3.2:3b".to_string() }
  }
}

impl Default for DigestConfig {
  fn default() -> Self {
    Self {
      subject:      "Research Digest".to_string(),
      sender:       String::new(),
      recipients:   Vec::new(),
      endpoint:     None,
      token_env:    "GLEANER_MAIL_TOKEN".to_string(),
      share_policy: SharePolicy::default(),
      top_n:        None,
    }
  }
}

impl Config {
  /// Default configuration file location.
  ///
  /// - On Unix: `~/.config/gleaner/config.toml`
  /// - On macOS: `~/Library/Application Support/gleaner/config.toml`
  /// - On Windows: `%APPDATA%\gleaner\config.toml`
  /// - Fallback: `./gleaner/config.toml`
  pub fn default_path() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("gleaner").join("config.toml")
  }

  /// Reads and validates a configuration file.
  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    if !path.is_file() {
      return Err(GleanerError::Config(format!(
        "Configuration file not found at {}",
        path.display()
      )));
    }
    let content = std::fs::read_to_string(path)?;
    let config = Self::from_toml(&content)?;
    debug!("Loaded configuration from {}", path.display());
    Ok(config)
  }

  /// Parses and validates configuration from a TOML string.
  pub fn from_toml(content: &str) -> Result<Self> {
    let config: Self = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  /// Checks values that would otherwise fail deep inside a stage.
  pub fn validate(&self) -> Result<()> {
    Url::parse(&self.base_url)?;
    if self.searches.is_empty() {
      return Err(GleanerError::Config("At least one `[[searches]]` entry is required".into()));
    }
    if self.searches.iter().any(|search| search.query.trim().is_empty()) {
      return Err(GleanerError::Config("Search queries must not be empty".into()));
    }
    if self.page_size == 0 {
      return Err(GleanerError::Config("`page_size` must be greater than zero".into()));
    }
    if self.window_days > window::MAX_WINDOW_DAYS {
      return Err(GleanerError::Config(format!(
        "`window_days` must be at most {}",
        window::MAX_WINDOW_DAYS
      )));
    }
    if self.digest.top_n == Some(0) {
      return Err(GleanerError::Config("`digest.top_n` must be greater than zero".into()));
    }
    if self.fetch_concurrency == 0 {
      return Err(GleanerError::Config("`fetch_concurrency` must be greater than zero".into()));
    }
    if !(self.summary.compression_rate > 0.0 && self.summary.compression_rate <= 1.0) {
      return Err(GleanerError::Config("`summary.compression_rate` must be in (0, 1]".into()));
    }
    Url::parse(&self.llm.host)?;
    if let Some(endpoint) = &self.digest.endpoint {
      Url::parse(endpoint)?;
    }
    Ok(())
  }

  /// Lock file path, defaulting to the database path with a `.lock` extension.
  pub fn lock_path(&self) -> PathBuf {
    self.lock_path.clone().unwrap_or_else(|| self.database_path.with_extension("lock"))
  }

  /// Per-request timeout.
  pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs) }

  /// Resolves credentials for this configuration from the environment.
  pub fn credentials(&self) -> Result<Credentials> { Credentials::from_env(self) }
}

/// Secrets and environment-supplied values resolved at startup.
#[derive(Clone, Default)]
pub struct Credentials {
  /// All digest recipients, from the file and the environment
  pub recipients: Vec<String>,
  /// Bearer token for the mail relay, when one is configured
  pub mail_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Credentials")
      .field("recipients", &self.recipients)
      .field("mail_token", &self.mail_token.as_ref().map(|_| "<redacted>"))
      .finish()
  }
}

impl Credentials {
  /// Loads `.env` if present, then resolves recipients and the relay token.
  pub fn from_env(config: &Config) -> Result<Self> {
    dotenvy::dotenv().ok();
    Self::resolve(config, |key| std::env::var(key).ok())
  }

  /// Resolves credentials through an arbitrary variable lookup.
  pub fn resolve(config: &Config, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
    let mut recipients: Vec<String> = Vec::new();
    let from_env = lookup(RECIPIENTS_ENV).unwrap_or_default();
    let candidates = config.digest.recipients.iter().map(String::as_str).chain(from_env.split(','));
    for candidate in candidates.map(str::trim).filter(|r| !r.is_empty()) {
      if !recipients.iter().any(|known| known == candidate) {
        recipients.push(candidate.to_string());
      }
    }

    if recipients.is_empty() {
      info!("No digest recipients configured, digests will not be dispatched");
      return Ok(Self { recipients, mail_token: None });
    }

    if config.digest.endpoint.is_none() {
      return Err(GleanerError::Config(
        "Digest recipients are configured but `digest.endpoint` is not set".into(),
      ));
    }

    let mail_token = lookup(&config.digest.token_env)
      .map(|token| token.trim().to_string())
      .filter(|token| !token.is_empty())
      .ok_or_else(|| {
        GleanerError::Config(format!(
          "Environment variable {} must hold the mail relay token",
          config.digest.token_env
        ))
      })?;

    Ok(Self { recipients, mail_token: Some(mail_token) })
  }
}
