//! Atom/OpenSearch result page parsing.
//!
//! The search API answers with an Atom feed carrying OpenSearch totals:
//!
//! ```xml
//! <feed xmlns="http://www.w3.org/2005/Atom">
//!   <opensearch:totalResults xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">1</opensearch:totalResults>
//!   <opensearch:startIndex xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">0</opensearch:startIndex>
//!   <entry>
//!     <id>http://arxiv.org/abs/2401.01234v1</id>
//!     <published>2024-01-02T18:59:59Z</published>
//!     <title>A Paper</title>
//!     <link title="pdf" href="http://arxiv.org/pdf/2401.01234v1" rel="related"/>
//!   </entry>
//! </feed>
//! ```
//!
//! Elements are matched by local name, so namespace prefixes do not matter.

use quick_xml::{
  events::{BytesStart, Event},
  Reader,
};

use super::*;

/// One parsed page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedPage {
  /// Total results the query matches
  pub total_results: usize,
  /// Offset of the first entry on this page
  pub start_index:   usize,
  /// Entries in document order
  pub entries:       Vec<RawEntry>,
}

/// A feed entry as it appeared on the wire, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
  /// Entry id, the abstract page URL
  pub id:        String,
  /// Title as published, possibly wrapped across lines
  pub title:     String,
  /// Publication timestamp as published
  pub published: String,
  /// Abstract text
  pub summary:   String,
}

impl FeedPage {
  /// Parses a raw response body.
  pub fn parse(data: &[u8]) -> Result<Self> {
    let mut reader = Reader::from_reader(data);
    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();

    let mut page = FeedPage::default();
    let mut total_results = None;
    let mut entry: Option<RawEntry> = None;

    loop {
      match reader.read_event_into(&mut buf)? {
        Event::Start(e) => {
          let name = local_name(&e);
          if name == "entry" {
            entry = Some(RawEntry::default());
          }
          path.push(name);
          text.clear();
        },
        Event::Text(e) =>
          text.push_str(&e.unescape().map_err(|err| GleanerError::Feed(err.to_string()))?),
        Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e.into_inner())),
        Event::End(_) => {
          let Some(name) = path.pop() else {
            return Err(GleanerError::Feed("unbalanced closing tag".into()));
          };
          let value = text.trim().to_string();
          text.clear();

          match (entry.as_mut(), name.as_str()) {
            (Some(_), "entry") => (),
            (Some(current), field) if path.last().map(String::as_str) == Some("entry") =>
              match field {
                "id" => current.id = value,
                "title" => current.title = value,
                "published" => current.published = value,
                "summary" => current.summary = value,
                _ => (),
              },
            (None, "totalResults") => total_results = Some(parse_count("totalResults", &value)?),
            (None, "startIndex") => page.start_index = parse_count("startIndex", &value)?,
            _ => (),
          }

          if name == "entry" {
            page.entries.extend(entry.take());
          }
        },
        Event::Eof => break,
        _ => (),
      }
      buf.clear();
    }

    if !path.is_empty() {
      return Err(GleanerError::Feed(format!("document ended inside <{}>", path.join("/"))));
    }
    page.total_results =
      total_results.ok_or_else(|| GleanerError::Feed("missing totalResults".into()))?;
    trace!(
      "Parsed page: total {} start {} entries {}",
      page.total_results,
      page.start_index,
      page.entries.len()
    );
    Ok(page)
  }

  /// Results left after this page's offset.
  pub fn remaining(&self) -> usize { self.total_results.saturating_sub(self.start_index) }
}

/// Element name with any namespace prefix removed.
fn local_name(e: &BytesStart<'_>) -> String {
  String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn parse_count(field: &str, value: &str) -> Result<usize> {
  value.parse().map_err(|_| GleanerError::Feed(format!("{field} is not a count: {value:?}")))
}

#[cfg(test)]
mod tests {
  use super::*;

  const PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <link href="http://arxiv.org/api/query?search_query=all:llm" rel="self" type="application/atom+xml"/>
  <title type="html">ArXiv Query: search_query=all:llm</title>
  <id>http://arxiv.org/api/cHxbiOdZaP56ODnBPIenZhzg5f8</id>
  <opensearch:totalResults xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">412</opensearch:totalResults>
  <opensearch:startIndex xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">200</opensearch:startIndex>
  <opensearch:itemsPerPage xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">200</opensearch:itemsPerPage>
  <entry>
    <id>http://arxiv.org/abs/2401.01234v1</id>
    <updated>2024-01-03T10:00:00Z</updated>
    <published>2024-01-02T18:59:59Z</published>
    <title>Prompt Injection &amp; Friends:
      A Survey</title>
    <summary>We survey things.</summary>
    <author><name>Alice Researcher</name></author>
    <author><name>Bob Scholar</name></author>
    <link href="http://arxiv.org/abs/2401.01234v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2401.01234v1" rel="related" type="application/pdf"/>
    <arxiv:primary_category xmlns:arxiv="http://arxiv.org/schemas/atom" term="cs.CR"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/hep-th/9901001v1</id>
    <published>1999-01-01T00:00:00Z</published>
    <title>Old Style</title>
  </entry>
</feed>"#;

  #[test]
  fn test_parse_page() {
    let page = FeedPage::parse(PAGE.as_bytes()).unwrap();
    assert_eq!(page.total_results, 412);
    assert_eq!(page.start_index, 200);
    assert_eq!(page.remaining(), 212);
    assert_eq!(page.entries.len(), 2);

    let first = &page.entries[0];
    assert_eq!(first.id, "http://arxiv.org/abs/2401.01234v1");
    assert_eq!(first.published, "2024-01-02T18:59:59Z");
    assert!(first.title.starts_with("Prompt Injection & Friends:"));
    assert_eq!(first.summary, "We survey things.");

    // Authors, links and categories are not needed downstream.
    assert_eq!(page.entries[1].id, "http://arxiv.org/abs/hep-th/9901001v1");
    assert!(page.entries[1].summary.is_empty());
  }

  #[test]
  fn test_feed_id_not_mistaken_for_entry() {
    let page = FeedPage::parse(PAGE.as_bytes()).unwrap();
    assert!(page.entries.iter().all(|entry| !entry.id.contains("/api/")));
  }

  #[test]
  fn test_empty_result_page() {
    let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
      <opensearch:totalResults xmlns:opensearch="x">0</opensearch:totalResults>
      <opensearch:startIndex xmlns:opensearch="x">0</opensearch:startIndex>
      <opensearch:itemsPerPage xmlns:opensearch="x">200</opensearch:itemsPerPage>
    </feed>"#;
    let page = FeedPage::parse(xml.as_bytes()).unwrap();
    assert_eq!(page.total_results, 0);
    assert_eq!(page.remaining(), 0);
    assert!(page.entries.is_empty());
  }

  #[test]
  fn test_missing_totals_is_malformed() {
    let err = FeedPage::parse(b"<html><body>Rate limited</body></html>").unwrap_err();
    assert!(matches!(err, GleanerError::Feed(_)));
  }

  #[test]
  fn test_non_numeric_totals_is_malformed() {
    let xml = "<feed><totalResults>many</totalResults></feed>";
    assert!(matches!(FeedPage::parse(xml.as_bytes()), Err(GleanerError::Feed(_))));
  }
}
