//! Error types for the gleaner binary.

use gleaner::error::GleanerError;
use thiserror::Error;

/// Result alias used throughout the binary.
pub type Result<T> = core::result::Result<T, GleanerdError>;

/// Errors that end a run of the binary with a non-zero exit status.
#[derive(Error, Debug)]
pub enum GleanerdError {
  /// Anything raised by the pipeline library.
  #[error(transparent)]
  Gleaner(#[from] GleanerError),

  /// The log directory could not be prepared.
  #[error(transparent)]
  Io(#[from] std::io::Error),

  /// A global subscriber was already installed.
  #[error("Failed to initialize logging: {0}")]
  Logging(#[from] tracing_subscriber::util::TryInitError),
}
