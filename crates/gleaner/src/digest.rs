//! Digest rendering and delivery.
//!
//! The digest stage selects summarized records inside the window, renders them once in three
//! formats, and hands one [`Message`] per recipient to a [`Courier`]. Delivery is at least once:
//! after dispatch every selected record is marked shared, whether or not each individual message
//! went through.
//!
//! Markdown is the source format. HTML is rendered from it with `pulldown-cmark`, so everything
//! interpolated into the Markdown is escaped there and arrives escaped in the HTML.
//!
//! # Examples
//!
//! ```
//! use chrono::Utc;
//! use gleaner::{digest::render, item::ItemRecord};
//!
//! let mut record = ItemRecord::discovered("2401.01234v1", "A <b>bold</b> claim", Utc::now());
//! record.summarized = true;
//! record.findings = vec!["It works.".into()];
//! record.one_liner = Some("Bold claims, checked.".into());
//!
//! let digest = render(&[record]);
//! assert!(digest.plain.contains("- It works."));
//! assert!(digest.html.contains("A &lt;b&gt;bold&lt;/b&gt; claim"));
//! ```

use pulldown_cmark::{html, Parser};

use super::*;
use crate::{
  database::{Query, Update},
  rank::Ranker,
};

lazy_static! {
  /// A leading `12.` or `3)` would start an ordered list.
  static ref ORDERED_MARKER: Regex = Regex::new(r"^(\d+)([.)])").unwrap();
}

/// Which summarized records a digest includes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharePolicy {
  /// Only records never shared before; each record is shared exactly once
  #[default]
  Unshared,
  /// Every summarized record in the window, including ones already shared
  All,
}

/// One digest in every output format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
  /// Plain text body
  pub plain:    String,
  /// HTML body
  pub html:     String,
  /// Markdown body
  pub markdown: String,
}

impl Rendered {
  /// Whether there is nothing to send.
  pub fn is_empty(&self) -> bool { self.plain.trim().is_empty() }
}

/// Renders records in the given order.
pub fn render(records: &[ItemRecord]) -> Rendered {
  let mut plain = String::new();
  let mut markdown = String::new();

  for record in records {
    let one_liner = record.one_liner.as_deref().unwrap_or_default();
    plain.push_str(&format!("{} - {} - {one_liner}\n", record.title, record.url));
    markdown.push_str(&format!(
      "**{}** (<{}>) - {}\n\n",
      escape_markdown(&record.title),
      record.url,
      escape_markdown(one_liner)
    ));

    for finding in &record.findings {
      plain.push_str(&format!("- {finding}\n"));
      markdown.push_str(&format!("- {}\n", escape_markdown(finding)));
    }
    plain.push('\n');
    markdown.push('\n');
  }

  let mut html = String::with_capacity(markdown.len() * 2);
  html::push_html(&mut html, Parser::new(&markdown));

  Rendered { plain, html, markdown }
}

/// Backslash-escapes text so Markdown renders it literally.
fn escape_markdown(text: &str) -> String {
  let mut escaped = String::with_capacity(text.len());
  for (i, c) in text.chars().enumerate() {
    let special = matches!(
      c,
      '\\' | '`' | '*' | '_' | '[' | ']' | '<' | '>' | '#' | '!' | '|' | '~' | '&'
    );
    if special || (i == 0 && matches!(c, '-' | '+' | '=')) {
      escaped.push('\\');
    }
    escaped.push(c);
  }
  ORDERED_MARKER.replace(&escaped, r"$1\$2").into_owned()
}

/// One rendered digest addressed to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
  /// Sender address
  pub sender:    String,
  /// Recipient address
  pub recipient: String,
  /// Subject line
  pub subject:   String,
  /// Rendered digest
  pub body:      Rendered,
}

/// Delivers a single digest message.
#[async_trait]
pub trait Courier: Send + Sync {
  /// Sends `message`; an error affects this message only.
  async fn deliver(&self, message: &Message) -> Result<()>;
}

/// [`Courier`] posting messages to an HTTP mail relay with a bearer token.
#[derive(Debug, Clone)]
pub struct HttpCourier {
  client:   reqwest::Client,
  endpoint: Url,
  token:    String,
}

#[derive(Serialize)]
struct RelayRequest<'a> {
  from:     &'a str,
  to:       &'a str,
  subject:  &'a str,
  text:     &'a str,
  html:     &'a str,
  markdown: &'a str,
}

impl HttpCourier {
  /// Courier for the relay at `endpoint`.
  pub fn new(endpoint: &str, token: impl Into<String>, timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self { client, endpoint: Url::parse(endpoint)?, token: token.into() })
  }
}

#[async_trait]
impl Courier for HttpCourier {
  async fn deliver(&self, message: &Message) -> Result<()> {
    let failed = |reason: String| GleanerError::Delivery {
      recipient: message.recipient.clone(),
      reason,
    };

    let request = RelayRequest {
      from:     &message.sender,
      to:       &message.recipient,
      subject:  &message.subject,
      text:     &message.body.plain,
      html:     &message.body.html,
      markdown: &message.body.markdown,
    };
    let response = self
      .client
      .post(self.endpoint.clone())
      .bearer_auth(&self.token)
      .json(&request)
      .send()
      .await
      .map_err(|e| failed(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      return Err(failed(format!("relay responded with status {}", status.as_u16())));
    }
    Ok(())
  }
}

/// [`Courier`] that only logs what it would send.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogCourier;

#[async_trait]
impl Courier for LogCourier {
  async fn deliver(&self, message: &Message) -> Result<()> {
    info!("Dry run: digest {:?} for {}", message.subject, message.recipient);
    debug!("Digest body:\n{}", message.body.plain);
    Ok(())
  }
}

/// Outcome counts for one digest pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigestReport {
  /// Records eligible for this digest
  pub selected:  usize,
  /// Eligible records left out by ranking, still unshared
  pub held_back: usize,
  /// Messages delivered
  pub sent:      usize,
  /// Messages that failed
  pub failed:    usize,
  /// Records newly marked shared
  pub marked:    usize,
}

impl Display for DigestReport {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{} selected, {} held back, {} sent, {} failed, {} marked shared",
      self.selected, self.held_back, self.sent, self.failed, self.marked
    )
  }
}

/// Collaborators and settings for the digest stage.
pub struct DigestStage<'a> {
  courier:    &'a dyn Courier,
  subject:    &'a str,
  sender:     &'a str,
  recipients: &'a [String],
  policy:     SharePolicy,
  ranker:     Option<Ranker<'a>>,
}

impl<'a> DigestStage<'a> {
  /// Creates the stage.
  pub fn new(
    courier: &'a dyn Courier,
    subject: &'a str,
    sender: &'a str,
    recipients: &'a [String],
    policy: SharePolicy,
  ) -> Self {
    Self { courier, subject, sender, recipients, policy, ranker: None }
  }

  /// Caps each digest to the ranker's limit, keeping the most important records.
  pub fn with_ranker(mut self, ranker: Option<Ranker<'a>>) -> Self {
    self.ranker = ranker;
    self
  }

  /// Subject line for a digest sent at `now`.
  pub fn subject_for(&self, now: DateTime<Utc>) -> String {
    format!("[{}] {}", now.format("%Y-%m-%d"), self.subject)
  }

  /// Selects, renders and dispatches the digest, then marks the selection shared.
  pub async fn run(
    &self,
    db: &mut Database,
    window: &Window,
    now: DateTime<Utc>,
  ) -> Result<DigestReport> {
    let mut records = Query::ready_to_share(window.start(), self.policy).execute(db).await?;
    let mut report = DigestReport { selected: records.len(), ..DigestReport::default() };

    if self.recipients.is_empty() {
      info!("No recipients configured, leaving {} record(s) unshared", records.len());
      return Ok(report);
    }
    if let Some(ranker) = &self.ranker {
      records = ranker.select(records).await;
      report.held_back = report.selected - records.len();
      report.selected = records.len();
    }
    for record in &records {
      debug!("Selected for digest: {record}");
    }
    let body = render(&records);
    if body.is_empty() {
      info!("Nothing to share");
      return Ok(report);
    }

    let subject = self.subject_for(now);
    for recipient in self.recipients {
      let message = Message {
        sender:    self.sender.to_string(),
        recipient: recipient.clone(),
        subject:   subject.clone(),
        body:      body.clone(),
      };
      match self.courier.deliver(&message).await {
        Ok(()) => report.sent += 1,
        Err(e) => {
          error!("{e}");
          report.failed += 1;
        },
      }
    }

    for record in &records {
      if Update::shared(&record.id).execute(db).await? {
        report.marked += 1;
      }
    }

    info!("Dispatched digest {subject:?}: {report}");
    Ok(report)
  }
}
