//! Paginated search collection.
//!
//! The [`Collector`] walks every configured [`SearchQuery`] page by page. Each follow-up request
//! depends on the totals reported by the previous page, so pages within one query are requested
//! sequentially; queries themselves are independent, and a failure in one never affects another.
//!
//! All HTTP traffic in the crate goes through the [`Transport`] trait, which keeps the collector
//! and the fetch stage testable without a network.
//!
//! # Examples
//!
//! ```no_run
//! use gleaner::collector::{Collector, HttpTransport, SearchQuery};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new("gleaner/0.1", Duration::from_secs(20))?;
//! let collector = Collector::new(&transport, "https://export.arxiv.org/api/query", 200)?;
//! let pages = collector.collect(&[SearchQuery::new("all:\"jailbreak\"+AND+cat:cs.*")]).await;
//! println!("collected {} pages", pages.len());
//! # Ok(())
//! # }
//! ```

use super::*;
use crate::feed::FeedPage;

/// A search to run, starting at `start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
  /// Pre-encoded `search_query` value, passed through verbatim
  pub query: String,
  /// Offset of the first requested result
  #[serde(default)]
  pub start: usize,
}

impl SearchQuery {
  /// A query starting at offset zero.
  pub fn new(query: impl Into<String>) -> Self { Self { query: query.into(), start: 0 } }
}

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct Fetched {
  /// Final URL after redirects
  pub url:    Url,
  /// Status code
  pub status: u16,
  /// Response body
  pub body:   Vec<u8>,
}

impl Fetched {
  /// Whether the status code is in the 2xx range.
  pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }

  /// Turns a non-success response into [`GleanerError::Status`].
  pub fn into_success(self) -> Result<Self> {
    if self.is_success() {
      Ok(self)
    } else {
      Err(GleanerError::Status { url: self.url.to_string(), status: self.status })
    }
  }
}

/// Minimal HTTP GET seam used by the collector and the fetch stage.
///
/// Implementations return `Err` only when no response was received; a response with an error
/// status is returned as `Ok` and checked by the caller with [`Fetched::into_success`].
#[async_trait]
pub trait Transport: Send + Sync {
  /// Issues a GET request for `url`.
  async fn get(&self, url: &Url) -> Result<Fetched>;
}

/// [`Transport`] backed by a shared `reqwest` client with a fixed per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
  /// Pooled client, cheap to clone
  client: reqwest::Client,
}

impl HttpTransport {
  /// Builds a transport sending `user_agent` and failing any request after `timeout`.
  pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder().user_agent(user_agent).timeout(timeout).build()?;
    Ok(Self { client })
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn get(&self, url: &Url) -> Result<Fetched> {
    trace!("GET {url}");
    let response = self.client.get(url.clone()).send().await?;
    let final_url = response.url().clone();
    let status = response.status().as_u16();
    let body = response.bytes().await?.to_vec();
    Ok(Fetched { url: final_url, status, body })
  }
}

/// Issues search queries and follows their pagination.
pub struct Collector<'a> {
  /// Where requests go
  transport:  &'a dyn Transport,
  /// Search endpoint
  base_url:   Url,
  /// Results requested per page
  page_size:  usize,
  /// Optional per-query cap on requested results
  result_cap: Option<usize>,
}

impl<'a> Collector<'a> {
  /// Creates a collector for `base_url` requesting `page_size` results per page.
  pub fn new(transport: &'a dyn Transport, base_url: &str, page_size: usize) -> Result<Self> {
    if page_size == 0 {
      return Err(GleanerError::Config("page size must be greater than zero".into()));
    }
    Ok(Self { transport, base_url: Url::parse(base_url)?, page_size, result_cap: None })
  }

  /// Stops each query after roughly `cap` results have been requested.
  pub fn with_result_cap(mut self, cap: Option<usize>) -> Self {
    self.result_cap = cap;
    self
  }

  /// Request URL for one page of `query`.
  ///
  /// The query is appended as-is: it is already encoded (`%20`, literal `+` as AND separator) and
  /// re-encoding it would change its meaning.
  pub fn page_url(&self, query: &str, start: usize) -> Result<Url> {
    let mut base = self.base_url.clone();
    base.set_query(None);
    Ok(Url::parse(&format!(
      "{base}?search_query={query}&start={start}&max_results={}",
      self.page_size
    ))?)
  }

  /// Collects the pages of every query, in query order.
  ///
  /// A failed or malformed page ends that query's chain; pages it already produced are kept.
  pub async fn collect(&self, queries: &[SearchQuery]) -> Vec<FeedPage> {
    let mut pages = Vec::new();
    for query in queries {
      let collected = self.collect_query(query).await;
      info!("Query {:?} yielded {} page(s)", query.query, collected.len());
      pages.extend(collected);
    }
    pages
  }

  /// Collects every page of a single query.
  pub async fn collect_query(&self, query: &SearchQuery) -> Vec<FeedPage> {
    let mut pages = Vec::new();
    let mut start = query.start;

    loop {
      let page = match self.request_page(&query.query, start).await {
        Ok(page) => page,
        Err(e) => {
          warn!("Stopping pagination of {:?} at offset {start}: {e}", query.query);
          break;
        },
      };

      // A stale startIndex echo must neither step backwards nor stall the countdown.
      let offset = page.start_index.max(start);
      let remaining = page.total_results.saturating_sub(offset);
      let next = offset + self.page_size;
      let exhausted = page.entries.is_empty() && page.total_results > 0;
      debug!(
        "Query {:?} offset {start}: {} entries, {remaining} remaining of {}",
        query.query,
        page.entries.len(),
        page.total_results
      );
      pages.push(page);

      if remaining <= self.page_size {
        break;
      }
      if exhausted {
        debug!("Query {:?} returned an empty page at offset {offset}", query.query);
        break;
      }
      if let Some(cap) = self.result_cap {
        if next - query.start >= cap {
          debug!("Query {:?} reached result cap {cap}", query.query);
          break;
        }
      }
      start = next;
    }

    pages
  }

  async fn request_page(&self, query: &str, start: usize) -> Result<FeedPage> {
    let url = self.page_url(query, start)?;
    let fetched = self.transport.get(&url).await?.into_success()?;
    FeedPage::parse(&fetched.body)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;

  /// Serves canned feed pages keyed by `start` and records every requested URL.
  struct PagedFeed {
    total:       usize,
    fail_at:     Option<usize>,
    /// Always report this startIndex instead of the requested one
    stale_start: Option<usize>,
    /// Serve pages without entries from this offset on
    empty_from:  Option<usize>,
    requests:    Mutex<Vec<Url>>,
  }

  impl PagedFeed {
    fn new(total: usize) -> Self {
      Self { total, fail_at: None, stale_start: None, empty_from: None, requests: Mutex::default() }
    }

    fn starts(&self) -> Vec<usize> {
      self
        .requests
        .lock()
        .unwrap()
        .iter()
        .filter_map(|url| {
          url.query_pairs().find(|(k, _)| k == "start").and_then(|(_, v)| v.parse().ok())
        })
        .collect()
    }
  }

  #[async_trait]
  impl Transport for PagedFeed {
    async fn get(&self, url: &Url) -> Result<Fetched> {
      self.requests.lock().unwrap().push(url.clone());
      let param = |name: &str| -> usize {
        url.query_pairs().find(|(k, _)| k == name).and_then(|(_, v)| v.parse().ok()).unwrap_or_default()
      };
      let (start, max) = (param("start"), param("max_results"));
      if self.fail_at == Some(start) || self.requests.lock().unwrap().len() > 50 {
        return Ok(Fetched { url: url.clone(), status: 503, body: Vec::new() });
      }
      let count = match self.empty_from {
        Some(from) if start >= from => 0,
        _ => max.min(self.total.saturating_sub(start)),
      };
      let entries: String = (start..start + count)
        .map(|i| format!("<entry><id>http://arxiv.org/abs/2401.{i:05}v1</id></entry>"))
        .collect();
      let body = format!(
        "<feed><totalResults>{}</totalResults><startIndex>{}</startIndex>{entries}</feed>",
        self.total,
        self.stale_start.unwrap_or(start)
      );
      Ok(Fetched { url: url.clone(), status: 200, body: body.into_bytes() })
    }
  }

  #[tokio::test]
  async fn test_follows_pagination_until_exhausted() {
    let feed = PagedFeed::new(450);
    let collector = Collector::new(&feed, "https://export.arxiv.org/api/query", 200).unwrap();
    let pages = collector.collect(&[SearchQuery::new("all:llm")]).await;
    assert_eq!(pages.len(), 3);
    assert_eq!(feed.starts(), vec![0, 200, 400]);
  }

  #[tokio::test]
  async fn test_zero_results_single_request() {
    let feed = PagedFeed::new(0);
    let collector = Collector::new(&feed, "https://export.arxiv.org/api/query", 200).unwrap();
    let pages = collector.collect(&[SearchQuery::new("all:nothing")]).await;
    assert_eq!(pages.len(), 1);
    assert!(pages[0].entries.is_empty());
    assert_eq!(feed.starts(), vec![0]);
  }

  #[tokio::test]
  async fn test_exact_page_boundary_stops() {
    let feed = PagedFeed::new(200);
    let collector = Collector::new(&feed, "https://export.arxiv.org/api/query", 200).unwrap();
    assert_eq!(collector.collect(&[SearchQuery::new("all:llm")]).await.len(), 1);
  }

  #[traced_test]
  #[tokio::test]
  async fn test_failure_keeps_collected_pages_and_continues_other_queries() {
    let mut feed = PagedFeed::new(1000);
    feed.fail_at = Some(400);
    let collector = Collector::new(&feed, "https://export.arxiv.org/api/query", 200).unwrap();
    let queries = [SearchQuery::new("all:a"), SearchQuery { query: "all:b".into(), start: 800 }];
    let pages = collector.collect(&queries).await;

    // Query a: 0, 200, then 400 fails. Query b: 800 only (1000 - 800 <= 200).
    assert_eq!(feed.starts(), vec![0, 200, 400, 800]);
    assert_eq!(pages.len(), 3);
    assert!(logs_contain("Stopping pagination"));
  }

  #[tokio::test]
  async fn test_result_cap_limits_requests() {
    let feed = PagedFeed::new(10_000);
    let collector = Collector::new(&feed, "https://export.arxiv.org/api/query", 100)
      .unwrap()
      .with_result_cap(Some(300));
    collector.collect(&[SearchQuery::new("all:llm")]).await;
    assert_eq!(feed.starts(), vec![0, 100, 200]);
  }

  #[tokio::test]
  async fn test_stale_start_index_cannot_loop() {
    let mut feed = PagedFeed::new(1000);
    feed.stale_start = Some(0);
    let collector = Collector::new(&feed, "https://export.arxiv.org/api/query", 200).unwrap();
    let pages = collector.collect(&[SearchQuery::new("all:llm")]).await;
    assert_eq!(feed.starts(), vec![0, 200, 400, 600, 800]);
    assert_eq!(pages.len(), 5);
  }

  #[tokio::test]
  async fn test_empty_page_ends_query() {
    let mut feed = PagedFeed::new(1000);
    feed.empty_from = Some(400);
    let collector = Collector::new(&feed, "https://export.arxiv.org/api/query", 200).unwrap();
    let pages = collector.collect(&[SearchQuery::new("all:llm")]).await;
    assert_eq!(feed.starts(), vec![0, 200, 400]);
    assert!(pages[2].entries.is_empty());
  }

  #[test]
  fn test_page_url_keeps_query_encoding() {
    let feed = PagedFeed::new(0);
    let collector = Collector::new(&feed, "https://export.arxiv.org/api/query", 50).unwrap();
    let url = collector.page_url("all:%22prompt%20injection%22+AND+cat:cs.*", 100).unwrap();
    assert_eq!(
      url.as_str(),
      "https://export.arxiv.org/api/query?search_query=all:%22prompt%20injection%22+AND+cat:cs.*&start=100&max_results=50"
    );
  }
}
