//! Client for summarizing documents with a locally running Ollama model.
//!
//! The summarize stage only sees the [`Summarizer`] trait. [`OllamaSummarizer`] implements it
//! with a two-message chat request (instruction as `system`, document as `user`) and asks the
//! model for a JSON reply, which is then parsed into a [`Summary`].
//!
//! # Examples
//!
//! ```no_run
//! use gleaner::llm::{LlamaRequest, DEFAULT_INSTRUCTION};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let response = LlamaRequest::new()
//!   .with_host("http://localhost:11434")
//!   .with_model("llama3.2:3b")
//!   .with_system(DEFAULT_INSTRUCTION)
//!   .with_message("Full text of a paper...")
//!   .send()
//!   .await?;
//!
//! println!("Response: {}", response.message.content);
//! # Ok(())
//! # }
//! ```

use super::*;

/// Instruction sent with every document unless the configuration overrides it.
pub const DEFAULT_INSTRUCTION: &str = "Assume the role of a technical writer. Present the main \
findings of the research succinctly. Summarize key findings by highlighting the most critical \
facts and actionable insights without directly referencing 'the research.' Focus on outcomes, \
significant percentages or statistics, and their broader implications. Each point should stand on \
its own, conveying a clear fact or insight relevant to the field of study.

Format the output as a JSON object that follows the following template.

'findings' // array that contains 3 single sentence findings.
'one_liner' // one-liner sentences noting what it's interesting in the paper";

/// Number of findings the default instruction asks for.
pub const EXPECTED_FINDINGS: usize = 3;

/// Path of the chat endpoint relative to the Ollama host.
const CHAT_ENDPOINT: &str = "api/chat";

/// Produces a raw reply for an instruction and a document.
#[async_trait]
pub trait Summarizer: Send + Sync {
  /// Returns the model's reply text, expected to hold a JSON summary.
  async fn summarize(&self, instruction: &str, content: &str) -> Result<String>;
}

/// Request builder for Ollama chat interactions.
#[derive(Debug, Serialize, Default)]
pub struct LlamaRequest {
  /// Model name as known to Ollama. Sending without one is an error.
  pub model: Option<String>,

  /// Conversation messages, processed in order. Must not be empty when sent.
  pub messages: Vec<Message>,

  /// Streaming is not supported; always `false`.
  pub stream: bool,

  /// Reply format constraint, `json` when a structured reply is wanted.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub format: Option<String>,

  /// Generation parameters.
  pub options: Options,

  /// The chat endpoint. Defaults to localhost with a warning. Skipped during serialization.
  #[serde(skip)]
  pub url: Option<Url>,

  /// Per-request timeout. Skipped during serialization.
  #[serde(skip)]
  pub timeout: Option<Duration>,
}

/// A single chat message.
///
/// ```
/// use gleaner::llm::Message;
///
/// let message = Message { role: "user".to_string(), content: "Summarize this.".to_string() };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
  /// `system`, `user` or `assistant`
  pub role:    String,
  /// Message text
  pub content: String,
}

/// Configuration options for LLM inference.
#[derive(Debug, Serialize, Deserialize)]
pub struct Options {
  /// Maximum number of tokens to generate
  num_predict: u64,
  /// Top-k sampling parameter
  top_k:       u64,
  /// Top-p (nucleus) sampling parameter
  top_p:       f64,
  /// Low temperature keeps the JSON shape stable
  temperature: f64,
}

impl Default for Options {
  fn default() -> Self { Self { num_predict: 1024, top_k: 40, top_p: 0.9, temperature: 0.2 } }
}

/// Response structure from Ollama chat requests.
///
/// Only `message` is relied on; timing fields vary between Ollama versions.
#[derive(Debug, Serialize, Deserialize)]
pub struct LlamaResponse {
  /// Name of the model used
  pub model:             String,
  /// Generated message content
  pub message:           Message,
  /// Whether generation is complete
  #[serde(default)]
  pub done:              bool,
  /// Reason for completion
  #[serde(default)]
  pub done_reason:       Option<String>,
  /// Total processing time in nanoseconds
  #[serde(default)]
  pub total_duration:    Option<u64>,
  /// Number of tokens in the prompt
  #[serde(default)]
  pub prompt_eval_count: Option<u64>,
  /// Number of generated tokens
  #[serde(default)]
  pub eval_count:        Option<u64>,
}

impl LlamaRequest {
  /// Creates a new request with default settings.
  pub fn new() -> Self { Self::default() }

  /// Points the request at the chat endpoint of `host`.
  pub fn with_host(mut self, host: &str) -> Self {
    self.url = Url::parse(host).and_then(|base| base.join(CHAT_ENDPOINT)).ok();
    if self.url.is_none() {
      warn!("Invalid Ollama host {host:?}, falling back to localhost");
    }
    self
  }

  /// Sets the model to use for the request.
  pub fn with_model(mut self, model: impl Into<String>) -> Self {
    self.model.replace(model.into());
    self
  }

  /// Adds a `system` message and asks for a JSON reply.
  pub fn with_system(mut self, instruction: &str) -> Self {
    self.messages.push(Message { role: "system".to_string(), content: instruction.to_string() });
    self.format = Some("json".to_string());
    self
  }

  /// Adds a `user` message to the conversation.
  pub fn with_message(mut self, content: &str) -> Self {
    self.messages.push(Message { role: "user".to_string(), content: content.to_string() });
    self
  }

  /// Fails the request if no reply arrives within `timeout`.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  /// Sends the request to the Ollama service.
  ///
  /// # Errors
  ///
  /// - [`GleanerError::LLMMissingModel`] when no model is set
  /// - [`GleanerError::LLMMissingMessage`] when there are no messages
  /// - Network and status errors, or a reply body that is not a chat response
  pub async fn send(&self) -> Result<LlamaResponse> {
    if self.model.is_none() {
      return Err(GleanerError::LLMMissingModel);
    }
    if self.messages.is_empty() {
      return Err(GleanerError::LLMMissingMessage);
    }

    let url = match &self.url {
      Some(url) => url.clone(),
      None => {
        warn!("No host set, using localhost");
        Url::parse("http://localhost:11434/api/chat")?
      },
    };

    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = self.timeout {
      builder = builder.timeout(timeout);
    }
    let response = builder.build()?.post(url.clone()).json(&self).send().await?;
    if !response.status().is_success() {
      return Err(GleanerError::Status { url: url.to_string(), status: response.status().as_u16() });
    }
    let llama_response: LlamaResponse = response.json().await?;
    trace!(
      "Model {} replied with {} eval tokens",
      llama_response.model,
      llama_response.eval_count.unwrap_or_default()
    );
    Ok(llama_response)
  }
}

/// [`Summarizer`] backed by an Ollama chat model.
#[derive(Debug, Clone)]
pub struct OllamaSummarizer {
  host:    String,
  model:   String,
  timeout: Option<Duration>,
}

impl OllamaSummarizer {
  /// Summarizer using `model` on the Ollama service at `host`.
  pub fn new(host: impl Into<String>, model: impl Into<String>) -> Self {
    Self { host: host.into(), model: model.into(), timeout: None }
  }

  /// Applies a per-request timeout.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
  async fn summarize(&self, instruction: &str, content: &str) -> Result<String> {
    let mut request = LlamaRequest::new()
      .with_host(&self.host)
      .with_model(self.model.as_str())
      .with_system(instruction)
      .with_message(content);
    if let Some(timeout) = self.timeout {
      request = request.with_timeout(timeout);
    }
    Ok(request.send().await?.message.content)
  }
}

/// Findings and synopsis produced for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
  /// Short standalone facts
  pub findings:  Vec<String>,
  /// One-sentence synopsis
  pub one_liner: String,
}

/// Wire shape of a reply; fields are optional so a missing key surfaces as a [`Summary`] error.
#[derive(Deserialize)]
struct RawSummary {
  findings:  Option<Vec<String>>,
  one_liner: Option<String>,
}

impl Summary {
  /// Parses a model reply.
  ///
  /// Tolerates a surrounding Markdown code fence and ignores keys other than `findings` and
  /// `one_liner`. Blank findings are dropped; a reply left without findings or without a synopsis
  /// is rejected.
  pub fn parse(reply: &str) -> Result<Self> {
    let raw: RawSummary = serde_json::from_str(strip_fence(reply))
      .map_err(|e| GleanerError::Summary(format!("reply is not a JSON object: {e}")))?;

    let summary = Self {
      findings:  raw
        .findings
        .unwrap_or_default()
        .into_iter()
        .map(|finding| finding.trim().to_string())
        .filter(|finding| !finding.is_empty())
        .collect(),
      one_liner: raw.one_liner.unwrap_or_default().trim().to_string(),
    };
    summary.validate()?;

    if summary.findings.len() != EXPECTED_FINDINGS {
      warn!("Expected {EXPECTED_FINDINGS} findings, model returned {}", summary.findings.len());
    }
    Ok(summary)
  }

  /// Rejects summaries that may not be persisted.
  pub fn validate(&self) -> Result<()> {
    if self.findings.is_empty() {
      return Err(GleanerError::Summary("`findings` is missing or empty".into()));
    }
    if self.one_liner.trim().is_empty() {
      return Err(GleanerError::Summary("`one_liner` is missing or empty".into()));
    }
    Ok(())
  }
}

/// Removes a Markdown code fence around a JSON reply.
pub(crate) fn strip_fence(reply: &str) -> &str {
  let trimmed = reply.trim();
  let Some(rest) = trimmed.strip_prefix("```") else {
    return trimmed;
  };
  // Drop the info string (`json`) on the opening line.
  let body = rest.split_once('\n').map_or("", |(_, body)| body);
  body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
