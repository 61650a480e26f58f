//! Incremental research paper discovery and digest pipeline.
//!
//! `gleaner` watches a public paper search API and turns what it finds into a
//! periodic digest:
//!
//! - Paginated search collection across many queries
//! - Cross-run deduplication by canonical paper identifier
//! - A persistent lifecycle store tracking what was fetched, summarized and shared
//! - Bounded-concurrency PDF download
//! - Text extraction, optional compression and LLM summarization
//! - Multi-format digest rendering and per-recipient delivery
//!
//! Every stage reads and writes the lifecycle store, so a run that fails halfway is picked up
//! by the next one without redoing finished work.
//!
//! # Getting Started
//!
//! ```no_run
//! use chrono::Utc;
//! use gleaner::{config::Config, database::Database, pipeline::Pipeline, prelude::*};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!   let config = Config::load(Config::default_path())?;
//!   let credentials = config.credentials()?;
//!
//!   let mut db = Database::open(&config.database_path).await?;
//!   let pipeline = Pipeline::from_config(&config, credentials)?;
//!   let report = pipeline.run(&mut db, Utc::now()).await?;
//!   println!("{report}");
//!   Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`collector`]: Paginated search requests and the HTTP [`collector::Transport`]
//! - [`feed`]: Atom/OpenSearch page parsing
//! - [`normalize`]: Entry normalization, deduplication and store upsert
//! - [`window`]: Recency window and pending-item filtering
//! - [`database`]: The lifecycle store and its instructions
//! - [`fetch`]: Concurrent payload download
//! - [`pdf`], [`compress`], [`llm`], [`summarize`]: The summarize stage and its collaborators
//! - [`digest`]: Digest rendering and delivery
//! - [`rank`]: Importance ranking for capped digests
//! - [`pipeline`]: Stage orchestration and the run lock

#![warn(missing_docs)]

use std::{
  collections::HashSet,
  fmt::Display,
  path::{Path, PathBuf},
  time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};
#[cfg(test)]
use {tempfile::tempdir, tracing_test::traced_test};

pub mod collector;
pub mod config;
pub mod database;
pub mod feed;
pub mod normalize;
pub mod window;

pub mod compress;
pub mod digest;
pub mod error;
pub mod fetch;
pub mod item;
pub mod llm;
pub mod pdf;
pub mod pipeline;
pub mod rank;
pub mod summarize;

use crate::{
  collector::Transport,
  compress::Compressor,
  config::Config,
  database::{Database, DatabaseInstruction},
  digest::Courier,
  error::*,
  item::ItemRecord,
  llm::Summarizer,
  pdf::Extractor,
  window::Window,
};

/// Common traits and types for ergonomic imports.
///
/// ```no_run
/// use gleaner::{database::Database, prelude::*};
///
/// async fn example() -> Result<(), GleanerError> {
///   let mut db = Database::open("gleaner.db").await?;
///   let items = gleaner::database::Query::list_all().execute(&mut db).await?;
///   println!("{} items tracked", items.len());
///   Ok(())
/// }
/// ```
pub mod prelude {
  pub use crate::{
    collector::Transport, compress::Compressor, database::DatabaseInstruction, digest::Courier,
    error::GleanerError, llm::Summarizer, pdf::Extractor,
  };
}
