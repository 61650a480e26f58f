//! Token-retention compression of extracted text.
//!
//! Papers are long and the summarizer's context is not, so the summarize stage can shrink a
//! document before sending it. [`RetentionCompressor`] keeps a fixed fraction of the whitespace
//! separated tokens, preferring the ones that carry information (numbers, long words, terms that
//! are not stopwords) and preserving their original order. Tokens closing a sentence or a line
//! are favoured so the result keeps its structure, and kept line ends stay line breaks.

use std::cmp::Reverse;

use super::*;

/// Shrinks document text ahead of summarization.
pub trait Compressor: Send + Sync {
  /// Returns a compressed version of `text`.
  fn compress(&self, text: &str) -> Result<String>;
}

lazy_static! {
  static ref STOPWORDS: HashSet<&'static str> = [
    "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "for", "from", "has",
    "have", "in", "into", "is", "it", "its", "of", "on", "or", "our", "that", "the", "their",
    "these", "this", "those", "to", "was", "we", "were", "which", "while", "with", "within",
  ]
  .into_iter()
  .collect();
}

/// A whitespace separated token and whether a line break follows it.
#[derive(Debug, Clone, Copy)]
struct Token<'a> {
  text:     &'a str,
  line_end: bool,
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
  let mut tokens = Vec::new();
  for line in text.lines() {
    let words: Vec<&str> = line.split_whitespace().collect();
    let last = words.len().saturating_sub(1);
    tokens.extend(words.into_iter().enumerate().map(|(i, text)| Token { text, line_end: i == last }));
  }
  tokens
}

/// Keeps the highest scoring `rate` share of tokens.
#[derive(Debug, Clone, Copy)]
pub struct RetentionCompressor {
  rate: f32,
}

impl RetentionCompressor {
  /// Compressor keeping `rate` of the tokens, `0 < rate <= 1`.
  pub fn new(rate: f32) -> Result<Self> {
    if !(rate > 0.0 && rate <= 1.0) {
      return Err(GleanerError::Config(format!("compression rate {rate} is not in (0, 1]")));
    }
    Ok(Self { rate })
  }
}

impl Compressor for RetentionCompressor {
  fn compress(&self, text: &str) -> Result<String> {
    let tokens = tokenize(text);
    if tokens.is_empty() {
      return Err(GleanerError::Extraction("nothing to compress".into()));
    }

    let keep = ((tokens.len() as f32 * self.rate).ceil() as usize).clamp(1, tokens.len());
    let mut ranked: Vec<usize> = (0..tokens.len()).collect();
    // Stable sort: equal scores keep document order.
    ranked.sort_by_key(|&i| Reverse(score(tokens[i])));
    let mut kept = ranked[..keep].to_vec();
    kept.sort_unstable();

    let mut compressed = String::new();
    for token in kept.into_iter().map(|i| tokens[i]) {
      compressed.push_str(token.text);
      compressed.push(if token.line_end { '\n' } else { ' ' });
    }
    let compressed = compressed.trim_end().to_string();
    debug!(
      "Compressed ~{} tokens to ~{} (rate {})",
      approximate_tokens(text),
      approximate_tokens(&compressed),
      self.rate
    );
    Ok(compressed)
  }
}

/// Rough token count, four characters per token.
pub fn approximate_tokens(text: &str) -> usize { text.chars().count().div_ceil(4) }

/// Score of any token ending a sentence or a line.
const STRUCTURE_SCORE: u32 = 5;

fn score(token: Token<'_>) -> u32 {
  let base = word_score(token.text);
  if token.line_end || token.text.ends_with(['.', '!', '?']) {
    base.max(STRUCTURE_SCORE)
  } else {
    base
  }
}

fn word_score(token: &str) -> u32 {
  let word = token.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
  if word.is_empty() {
    return 0;
  }
  if STOPWORDS.contains(word.as_str()) {
    return 1;
  }
  if word.chars().any(|c| c.is_ascii_digit()) {
    return 6;
  }
  match word.chars().count() {
    0..=3 => 2,
    4..=7 => 3,
    _ => 4,
  }
}
