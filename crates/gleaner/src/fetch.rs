//! Concurrent payload download.
//!
//! The fetch stage is the only place the pipeline fans out: requests run concurrently with at
//! most `concurrency` in flight, and the stage waits for every one of them before returning.
//! Store updates happen afterwards, one record at a time, on the calling task.

use futures::{stream, StreamExt};

use super::*;
use crate::{
  database::Update,
  item::{id_from_payload_url, payload_file_name},
};

/// Outcome counts for one fetch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchReport {
  /// Distinct URLs considered
  pub requested:  usize,
  /// Payloads written and marked downloaded
  pub downloaded: usize,
  /// URLs skipped or failed
  pub failed:     usize,
}

impl Display for FetchReport {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} requested, {} downloaded, {} failed", self.requested, self.downloaded, self.failed)
  }
}

/// Downloads payloads into the paper directory.
pub struct Fetcher<'a> {
  transport:   &'a dyn Transport,
  paper_dir:   PathBuf,
  concurrency: usize,
}

impl<'a> Fetcher<'a> {
  /// Creates a fetcher writing into `paper_dir` with at most `concurrency` requests in flight.
  pub fn new(transport: &'a dyn Transport, paper_dir: impl Into<PathBuf>, concurrency: usize) -> Self {
    Self { transport, paper_dir: paper_dir.into(), concurrency: concurrency.max(1) }
  }

  /// Directory payloads are written to.
  pub fn paper_dir(&self) -> &Path { &self.paper_dir }

  /// Downloads every distinct URL and marks the matching records as downloaded.
  ///
  /// Individual failures are logged and counted; only store errors are returned.
  pub async fn fetch(&self, db: &mut Database, urls: &[String]) -> Result<FetchReport> {
    let mut seen = HashSet::new();
    let unique: Vec<&str> =
      urls.iter().map(String::as_str).filter(|url| seen.insert(*url)).collect();
    let mut report = FetchReport { requested: unique.len(), ..FetchReport::default() };
    if unique.is_empty() {
      return Ok(report);
    }

    tokio::fs::create_dir_all(&self.paper_dir).await?;

    let mut targets = Vec::with_capacity(unique.len());
    for url in unique {
      match (id_from_payload_url(url), Url::parse(url)) {
        (Some(id), Ok(parsed)) => targets.push((id, parsed)),
        (_, Err(e)) => {
          warn!("Skipping unparseable payload URL {url}: {e}");
          report.failed += 1;
        },
        (None, Ok(_)) => {
          warn!("Skipping {url}: no identifier in payload URL");
          report.failed += 1;
        },
      }
    }

    let outcomes: Vec<(String, Result<()>)> = stream::iter(targets)
      .map(|(id, url)| async move {
        let outcome = self.download(&id, &url).await;
        (id, outcome)
      })
      .buffer_unordered(self.concurrency)
      .collect()
      .await;

    for (id, outcome) in outcomes {
      match outcome {
        Ok(()) => {
          Update::downloaded(&id).execute(db).await?;
          report.downloaded += 1;
        },
        Err(e) => {
          error!("Failed to fetch {id}: {e}");
          report.failed += 1;
        },
      }
    }

    Ok(report)
  }

  async fn download(&self, id: &str, url: &Url) -> Result<()> {
    debug!("Downloading {url}");
    let fetched = self.transport.get(url).await?.into_success()?;
    if fetched.body.is_empty() {
      return Err(GleanerError::Extraction(format!("{url} returned an empty body")));
    }

    // Write under a temporary name so an interrupted write never looks like a payload.
    let path = self.paper_dir.join(payload_file_name(id));
    let partial = path.with_extension("part");
    tokio::fs::write(&partial, &fetched.body).await?;
    tokio::fs::rename(&partial, &path).await?;
    trace!("Wrote {} bytes to {}", fetched.body.len(), path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use chrono::TimeZone;

  use super::*;
  use crate::{
    collector::Fetched,
    database::{Add, Query},
  };

  /// Serves a small body for every URL except those listed as missing.
  #[derive(Default)]
  struct Payloads {
    missing:  Vec<String>,
    requests: Mutex<Vec<String>>,
  }

  #[async_trait]
  impl Transport for Payloads {
    async fn get(&self, url: &Url) -> Result<Fetched> {
      self.requests.lock().unwrap().push(url.to_string());
      let status = if self.missing.iter().any(|m| m == url.as_str()) { 404 } else { 200 };
      Ok(Fetched { url: url.clone(), status, body: b"%PDF-1.5 payload".to_vec() })
    }
  }

  async fn store_with(ids: &[&str]) -> (Database, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let mut db = Database::open(dir.path().join("gleaner.db")).await.unwrap();
    let published = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let records: Vec<_> = ids.iter().map(|id| ItemRecord::discovered(*id, "Paper", published)).collect();
    Add::items(&records).execute(&mut db).await.unwrap();
    (db, dir)
  }

  #[traced_test]
  #[tokio::test]
  async fn test_same_url_fetched_once() {
    let (mut db, dir) = store_with(&["2403.00001v1"]).await;
    let transport = Payloads::default();
    let fetcher = Fetcher::new(&transport, dir.path().join("papers"), 4);

    let url = "https://arxiv.org/pdf/2403.00001v1.pdf".to_string();
    let report = fetcher.fetch(&mut db, &[url.clone(), url.clone(), url]).await.unwrap();

    assert_eq!(transport.requests.lock().unwrap().len(), 1);
    assert_eq!(report, FetchReport { requested: 1, downloaded: 1, failed: 0 });
    assert!(dir.path().join("papers").join("2403.00001v1.pdf").is_file());
    assert!(Query::by_id("2403.00001v1").execute(&mut db).await.unwrap()[0].downloaded);
  }

  #[traced_test]
  #[tokio::test]
  async fn test_failures_leave_records_undownloaded() {
    let (mut db, dir) = store_with(&["2403.00001v1", "hep-th/9901001v1"]).await;
    let transport = Payloads {
      missing: vec!["https://arxiv.org/pdf/2403.00001v1.pdf".into()],
      ..Payloads::default()
    };
    let fetcher = Fetcher::new(&transport, dir.path(), 2);

    let urls = [
      "https://arxiv.org/pdf/2403.00001v1.pdf".to_string(),
      "https://arxiv.org/pdf/hep-th/9901001v1.pdf".to_string(),
      "https://example.com/not-a-paper".to_string(),
    ];
    let report = fetcher.fetch(&mut db, &urls).await.unwrap();
    assert_eq!(report, FetchReport { requested: 3, downloaded: 1, failed: 2 });

    let items = Query::list_all().execute(&mut db).await.unwrap();
    let downloaded: Vec<_> = items.iter().filter(|i| i.downloaded).map(|i| i.id.as_str()).collect();
    assert_eq!(downloaded, ["hep-th/9901001v1"]);
    assert!(dir.path().join("hep-th_9901001v1.pdf").is_file());
    assert!(logs_contain("Failed to fetch 2403.00001v1"));
  }
}
