//! The summarize stage.
//!
//! Every record inside the window that has no summary yet goes through the same steps: locate the
//! payload (downloading it if it is missing), extract its text, optionally compress it, ask the
//! [`Summarizer`] for findings and a synopsis, and persist the result. A failure at any step skips
//! that record only; it stays unsummarized and is retried on the next run. Store errors abort the
//! stage.

use super::*;
use crate::{
  database::{Query, Update},
  fetch::Fetcher,
  llm::Summary,
};

/// Outcome counts for one summarize pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummarizeReport {
  /// Records that needed a summary
  pub considered: usize,
  /// Records summarized in this pass
  pub summarized: usize,
  /// Records skipped after a failure
  pub skipped:    usize,
}

impl Display for SummarizeReport {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} considered, {} summarized, {} skipped", self.considered, self.summarized, self.skipped)
  }
}

/// Collaborators and settings for the summarize stage.
pub struct SummarizeStage<'a> {
  fetcher:     &'a Fetcher<'a>,
  extractor:   &'a dyn Extractor,
  compressor:  Option<&'a dyn Compressor>,
  summarizer:  &'a dyn Summarizer,
  instruction: &'a str,
}

impl<'a> SummarizeStage<'a> {
  /// Creates the stage without compression.
  pub fn new(
    fetcher: &'a Fetcher<'a>,
    extractor: &'a dyn Extractor,
    summarizer: &'a dyn Summarizer,
    instruction: &'a str,
  ) -> Self {
    Self { fetcher, extractor, compressor: None, summarizer, instruction }
  }

  /// Compresses extracted text with `compressor` before summarizing.
  pub fn with_compressor(mut self, compressor: Option<&'a dyn Compressor>) -> Self {
    self.compressor = compressor;
    self
  }

  /// Summarizes every pending record in `window`.
  pub async fn run(&self, db: &mut Database, window: &Window) -> Result<SummarizeReport> {
    let records = Query::pending_summary(window.start()).execute(db).await?;
    let mut report = SummarizeReport { considered: records.len(), ..SummarizeReport::default() };
    info!("Summarizing {} record(s)", records.len());

    for record in &records {
      debug!("Processing {record}");
      let summary = match self.summarize_one(db, record).await? {
        Ok(summary) => summary,
        Err(e) => {
          error!("Skipping summary of {}: {e}", record.id);
          report.skipped += 1;
          continue;
        },
      };

      if Update::summarized(&record.id, &summary).execute(db).await? {
        debug!("Summarized {}: {}", record.id, summary.one_liner);
        report.summarized += 1;
      }
    }

    Ok(report)
  }

  /// Produces a summary for one record.
  ///
  /// The outer `Result` carries store errors, the inner one the item-local failure.
  async fn summarize_one(
    &self,
    db: &mut Database,
    record: &ItemRecord,
  ) -> Result<Result<Summary>> {
    let path = record.payload_path(self.fetcher.paper_dir());
    if path.is_file() {
      if !record.downloaded {
        debug!("Adopting payload already on disk for {}", record.id);
        Update::downloaded(&record.id).execute(db).await?;
      }
    } else {
      debug!("Payload for {} missing, fetching it", record.id);
      self.fetcher.fetch(db, &[record.url.clone()]).await?;
      if !path.is_file() {
        return Ok(Err(GleanerError::Extraction(format!(
          "payload {} is unavailable",
          path.display()
        ))));
      }
    }

    Ok(self.summarize_payload(&path).await)
  }

  async fn summarize_payload(&self, path: &Path) -> Result<Summary> {
    let data = tokio::fs::read(path).await?;
    let text = self.extractor.extract(&data)?;

    let content = match self.compressor {
      Some(compressor) => compressor.compress(&text).unwrap_or_else(|e| {
        warn!("Compression failed, sending uncompressed text: {e}");
        text
      }),
      None => text,
    };

    let reply = self.summarizer.summarize(self.instruction, &content).await?;
    trace!("Summarizer reply: {reply}");
    Summary::parse(&reply)
  }
}
