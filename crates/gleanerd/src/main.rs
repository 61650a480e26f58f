//! Command line entry point for the gleaner paper digest pipeline.
//!
//! One invocation performs one complete run: collect, normalize, fetch, summarize and digest. It is
//! meant to be scheduled (cron, a systemd timer) rather than kept running; overlapping invocations
//! are refused through a lock file next to the database.
//!
//! # Usage
//!
//! ```bash
//! # Run with the default configuration file
//! gleaner
//!
//! # Run with an explicit configuration and debug logging
//! gleaner --config ./gleaner.toml -vvv
//!
//! # Also keep daily log files
//! gleaner --log-dir /var/log/gleaner
//! ```
//!
//! Secrets come from the environment (or a `.env` file): the mail relay token variable named by
//! `digest.token_env`, and optional extra recipients in `GLEANER_RECIPIENTS`.

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{builder::ArgAction, Parser};
use console::style;
use gleaner::{
  config::Config,
  database::Database,
  pipeline::{Pipeline, RunLock},
};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod error;

use crate::error::*;

/// Prefix for information messages
static INFO_PREFIX: &str = "ℹ ";
/// Prefix for success messages
static SUCCESS_PREFIX: &str = "✓ ";
/// Prefix for error messages
static ERROR_PREFIX: &str = "✗ ";
/// Continuation line for tree structure
static CONTINUE_PREFIX: &str = "│  ";

/// Command line interface configuration and argument parsing
#[derive(Parser)]
#[command(author, version, about = "Collects, summarizes and mails a digest of new research papers")]
pub struct Cli {
  /// Verbose mode (-v, -vv, -vvv) for different levels of logging detail
  #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging verbosity"
    )]
  verbose: u8,

  /// Path to the configuration file. If not specified, uses the default platform-specific
  /// configuration directory.
  #[arg(long, short)]
  config: Option<PathBuf>,

  /// Directory for daily rolling log files, in addition to stderr.
  #[arg(long)]
  log_dir: Option<PathBuf>,
}

/// Configures the logging system based on the verbosity level
///
/// `RUST_LOG` takes precedence over the flag. The verbosity levels are:
/// - 0: error (default)
/// - 1: warn
/// - 2: info
/// - 3: debug
/// - 4+: trace
///
/// The returned guard flushes the log file when dropped and must live until exit.
fn setup_logging(verbosity: u8, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter = match verbosity {
    0 => "error",
    1 => "warn",
    2 => "info",
    3 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

  let console = fmt::layer()
    .with_writer(std::io::stderr)
    .with_file(true)
    .with_line_number(true)
    .with_thread_ids(true)
    .with_target(true);

  let (file, guard) = match log_dir {
    Some(dir) => {
      std::fs::create_dir_all(dir)?;
      let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "gleaner.log"));
      let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(true);
      (Some(layer), Some(guard))
    },
    None => (None, None),
  };

  tracing_subscriber::registry().with(filter).with(console).with(file).try_init()?;
  Ok(guard)
}

/// Runs the pipeline once.
///
/// Configuration and credentials are checked before the lock is taken or anything touches the
/// network, so a misconfigured invocation fails fast.
async fn run(config_path: &Path) -> Result<()> {
  println!(
    "{} Loading configuration from {}",
    style(INFO_PREFIX).cyan(),
    style(config_path.display()).yellow()
  );
  let config = Config::load(config_path)?;
  let credentials = config.credentials()?;
  debug!("Resolved credentials: {credentials:?}");

  let _lock = RunLock::acquire(config.lock_path())?;
  let mut db = Database::open(&config.database_path).await?;
  let pipeline = Pipeline::from_config(&config, credentials)?;

  info!("Starting run with {} search(es)", config.searches.len());
  let report = pipeline.run(&mut db, Utc::now()).await?;

  println!("{} Run complete", style(SUCCESS_PREFIX).green());
  for line in report.to_string().lines() {
    println!("{}{line}", style(CONTINUE_PREFIX).dim());
  }
  Ok(())
}

/// Entry point for the gleaner binary
///
/// # Errors
///
/// Returns [`GleanerdError`] when the configuration is missing or invalid, a required secret is
/// absent, another run holds the lock, or the lifecycle store fails. Failures of individual
/// papers or messages are logged and do not fail the run.
#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let _guard = setup_logging(cli.verbose, cli.log_dir.as_deref())?;

  let config_path = cli.config.unwrap_or_else(Config::default_path);
  let result = run(&config_path).await;
  if let Err(e) = &result {
    eprintln!("{} {}", style(ERROR_PREFIX).red(), style(e).red());
  }
  result
}
