//! Stage orchestration and the run lock.
//!
//! A [`Pipeline`] runs the stages in order on a single task:
//!
//! 1. collect result pages for every search
//! 2. normalize and deduplicate entries, inserting new records
//! 3. download payloads for new in-window records
//! 4. summarize unsummarized in-window records
//! 5. render and dispatch the digest
//!
//! Each stage reads its input from the store rather than from the previous stage, so a run that
//! dies halfway is completed by the next one. [`RunLock`] keeps two runs from overlapping.

use std::{fs::OpenOptions, io::Write};

use super::*;
use crate::{
  collector::{Collector, HttpTransport},
  compress::RetentionCompressor,
  config::Credentials,
  digest::{DigestReport, DigestStage, HttpCourier, LogCourier},
  fetch::{FetchReport, Fetcher},
  llm::OllamaSummarizer,
  normalize::{normalize, upsert},
  pdf::PdfExtractor,
  rank::Ranker,
  summarize::{SummarizeReport, SummarizeStage},
};

/// Counts from every stage of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
  /// Start of the window the run used
  pub window_start: DateTime<Utc>,
  /// Result pages collected
  pub pages:        usize,
  /// Unique records seen in this run's pages
  pub discovered:   usize,
  /// Records new to the store
  pub inserted:     usize,
  /// Fetch stage outcome
  pub fetch:        FetchReport,
  /// Summarize stage outcome
  pub summarize:    SummarizeReport,
  /// Digest stage outcome
  pub digest:       DigestReport,
}

impl Display for RunReport {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    writeln!(f, "window:    since {}", self.window_start.format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(
      f,
      "collect:   {} page(s), {} unique, {} new",
      self.pages, self.discovered, self.inserted
    )?;
    writeln!(f, "fetch:     {}", self.fetch)?;
    writeln!(f, "summarize: {}", self.summarize)?;
    write!(f, "digest:    {}", self.digest)
  }
}

/// All collaborators and settings needed for a run.
pub struct Pipeline {
  config:      Config,
  recipients:  Vec<String>,
  transport:   Box<dyn Transport>,
  extractor:   Box<dyn Extractor>,
  compressor:  Option<Box<dyn Compressor>>,
  summarizer:  Box<dyn Summarizer>,
  courier:     Box<dyn Courier>,
}

impl Pipeline {
  /// Builds the production collaborators described by `config`.
  ///
  /// Without a relay endpoint and token, digests go to a [`LogCourier`].
  pub fn from_config(config: &Config, credentials: Credentials) -> Result<Self> {
    config.validate()?;
    let transport = HttpTransport::new(&config.user_agent, config.request_timeout())?;

    let compressor: Option<Box<dyn Compressor>> = if config.summary.compress {
      Some(Box::new(RetentionCompressor::new(config.summary.compression_rate)?))
    } else {
      None
    };

    let courier: Box<dyn Courier> = match (&config.digest.endpoint, &credentials.mail_token) {
      (Some(endpoint), Some(token)) =>
        Box::new(HttpCourier::new(endpoint, token.as_str(), config.request_timeout())?),
      _ => {
        debug!("No mail relay configured, digests will only be logged");
        Box::new(LogCourier)
      },
    };

    Ok(Self {
      config: config.clone(),
      recipients: credentials.recipients,
      transport: Box::new(transport),
      extractor: Box::new(PdfExtractor::new()),
      compressor,
      summarizer: Box::new(OllamaSummarizer::new(&config.llm.host, &config.llm.model)),
      courier,
    })
  }

  /// Replaces the HTTP transport used for searches and downloads.
  pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
    self.transport = Box::new(transport);
    self
  }

  /// Replaces the text extractor.
  pub fn with_extractor(mut self, extractor: impl Extractor + 'static) -> Self {
    self.extractor = Box::new(extractor);
    self
  }

  /// Replaces or removes the compressor.
  pub fn with_compressor(mut self, compressor: Option<Box<dyn Compressor>>) -> Self {
    self.compressor = compressor;
    self
  }

  /// Replaces the summarizer.
  pub fn with_summarizer(mut self, summarizer: impl Summarizer + 'static) -> Self {
    self.summarizer = Box::new(summarizer);
    self
  }

  /// Replaces the digest courier.
  pub fn with_courier(mut self, courier: impl Courier + 'static) -> Self {
    self.courier = Box::new(courier);
    self
  }

  /// The configuration this pipeline runs with.
  pub fn config(&self) -> &Config { &self.config }

  /// Runs every stage once with the window ending at `now`.
  ///
  /// Item-level failures are logged and counted in the report; store failures end the run.
  pub async fn run(&self, db: &mut Database, now: DateTime<Utc>) -> Result<RunReport> {
    let config = &self.config;
    let window = Window::trailing_days(now, config.window_days);
    info!("Running with window starting {}", window.store_boundary());

    info!("Executing {} search(es)", config.searches.len());
    let collector = Collector::new(self.transport.as_ref(), &config.base_url, config.page_size)?
      .with_result_cap(config.result_cap);
    let pages = collector.collect(&config.searches).await;

    info!("Assembling records from {} page(s)", pages.len());
    let records = normalize(&pages);
    let inserted = upsert(db, &records).await?;

    let fetcher =
      Fetcher::new(self.transport.as_ref(), &config.paper_dir, config.fetch_concurrency);
    let urls: Vec<String> = window::pending(&records, &window, &config.paper_dir)
      .into_iter()
      .map(|record| record.url.clone())
      .collect();
    info!("Downloading {} payload(s)", urls.len());
    let fetch = fetcher.fetch(db, &urls).await?;
    info!("Fetch finished: {fetch}");

    let summarize = SummarizeStage::new(
      &fetcher,
      self.extractor.as_ref(),
      self.summarizer.as_ref(),
      &config.summary.instruction,
    )
    .with_compressor(self.compressor.as_deref())
    .run(db, &window)
    .await?;
    info!("Summarize finished: {summarize}");

    let digest = DigestStage::new(
      self.courier.as_ref(),
      &config.digest.subject,
      &config.digest.sender,
      &self.recipients,
      config.digest.share_policy,
    )
    .with_ranker(config.digest.top_n.map(|limit| Ranker::new(self.summarizer.as_ref(), limit)))
    .run(db, &window, now)
    .await?;
    info!("Digest finished: {digest}");

    Ok(RunReport {
      window_start: window.start(),
      pages: pages.len(),
      discovered: records.len(),
      inserted,
      fetch,
      summarize,
      digest,
    })
  }
}

/// Exclusive lock file held for the duration of a run.
///
/// The file holds the owner's process id. A lock left behind by a process that no longer exists
/// is replaced; the lock is released when the guard is dropped.
#[derive(Debug)]
pub struct RunLock {
  path: PathBuf,
}

impl RunLock {
  /// Takes the lock at `path`, failing with [`GleanerError::AlreadyRunning`] if a live process
  /// holds it.
  pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)?;
    }

    // Second attempt only happens after a stale lock was removed.
    for _ in 0..2 {
      match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
          writeln!(file, "{}", std::process::id())?;
          debug!("Acquired run lock {}", path.display());
          return Ok(Self { path: path.to_path_buf() });
        },
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
          if holder_alive(path) {
            return Err(GleanerError::AlreadyRunning(path.to_path_buf()));
          }
          warn!("Removing stale run lock {}", path.display());
          match std::fs::remove_file(path) {
            Ok(()) => (),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
            Err(e) => return Err(e.into()),
          }
        },
        Err(e) => return Err(e.into()),
      }
    }
    Err(GleanerError::AlreadyRunning(path.to_path_buf()))
  }

  /// Location of the lock file.
  pub fn path(&self) -> &Path { &self.path }
}

impl Drop for RunLock {
  fn drop(&mut self) {
    if let Err(e) = std::fs::remove_file(&self.path) {
      warn!("Failed to release run lock {}: {e}", self.path.display());
    }
  }
}

fn holder_alive(path: &Path) -> bool {
  match std::fs::read_to_string(path) {
    Ok(contents) => match contents.trim().parse::<i32>() {
      Ok(pid) if pid > 0 => process_alive(pid),
      _ => false,
    },
    // Gone already: the holder just released it.
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
    Err(_) => true,
  }
}

#[cfg(unix)]
fn process_alive(pid: i32) -> bool {
  use nix::{errno::Errno, sys::signal::kill, unistd::Pid};

  match kill(Pid::from_raw(pid), None) {
    Ok(()) | Err(Errno::EPERM) => true,
    Err(_) => false,
  }
}

#[cfg(not(unix))]
fn process_alive(_pid: i32) -> bool { true }
