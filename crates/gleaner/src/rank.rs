//! Importance ranking for digests capped to a few papers.
//!
//! When more summarized records are ready than a digest may carry, the candidates are listed for
//! the model (title, synopsis, findings and an abstract excerpt) and it scores each one from 1 to
//! 10. The highest scoring records are kept; ties keep the newer record. The request goes through
//! the same [`Summarizer`] as document summaries, with [`RANKING_INSTRUCTION`] as the instruction.

use super::*;
use crate::llm::strip_fence;

/// Instruction sent with the candidate list.
pub const RANKING_INSTRUCTION: &str = "Assume the role of a research reviewer. Rate the importance \
of every paper in the list from 1 to 10, judging technical novelty, likely impact and practical \
relevance. Reply with JSON only, without explanations, following this template.

{\"scores\": [{\"index\": 1, \"score\": 9}, {\"index\": 2, \"score\": 5}]}

'index' is the paper's number in the list.";

/// Longest abstract excerpt included per candidate, in characters.
const ABSTRACT_EXCERPT_CHARS: usize = 600;

/// One score as the model reports it.
#[derive(Debug, Deserialize)]
struct RawScore {
  index: usize,
  score: f64,
}

/// Replies are accepted wrapped in an object or as a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRanking {
  Wrapped { scores: Vec<RawScore> },
  Bare(Vec<RawScore>),
}

/// Renders the numbered candidate list sent to the model.
pub fn ranking_prompt(records: &[ItemRecord]) -> String {
  let mut prompt = String::new();
  for (i, record) in records.iter().enumerate() {
    prompt.push_str(&format!("{}. Title: {}\n", i + 1, record.title));
    if let Some(one_liner) = &record.one_liner {
      prompt.push_str(&format!("Synopsis: {one_liner}\n"));
    }
    for finding in &record.findings {
      prompt.push_str(&format!("- {finding}\n"));
    }
    if !record.abstract_text.is_empty() {
      let excerpt: String = record.abstract_text.chars().take(ABSTRACT_EXCERPT_CHARS).collect();
      prompt.push_str(&format!("Abstract: {excerpt}\n"));
    }
    prompt.push('\n');
  }
  prompt
}

/// Parses a ranking reply into one score per candidate.
///
/// Indices are 1-based. Entries pointing outside the list are ignored and candidates the model
/// skipped score zero. A reply with no usable score is an error.
pub fn parse_scores(reply: &str, count: usize) -> Result<Vec<f64>> {
  let raw: RawRanking = serde_json::from_str(strip_fence(reply))
    .map_err(|e| GleanerError::Summary(format!("ranking reply is not a score list: {e}")))?;
  let raw = match raw {
    RawRanking::Wrapped { scores } | RawRanking::Bare(scores) => scores,
  };

  let mut scores = vec![0.0; count];
  let mut usable = 0;
  for RawScore { index, score } in raw {
    match index.checked_sub(1).filter(|i| *i < count) {
      Some(i) if score.is_finite() => {
        scores[i] = score;
        usable += 1;
      },
      _ => trace!("Ignoring score for index {index}"),
    }
  }
  if usable == 0 {
    return Err(GleanerError::Summary("ranking reply scored no listed paper".into()));
  }
  Ok(scores)
}

/// Keeps the `limit` highest scoring records, in their original order.
pub fn keep_top(records: Vec<ItemRecord>, scores: &[f64], limit: usize) -> Vec<ItemRecord> {
  let mut order: Vec<usize> = (0..records.len()).collect();
  // Stable, so equal scores keep list order.
  order.sort_by(|a, b| scores[*b].total_cmp(&scores[*a]));
  let kept: HashSet<usize> = order.into_iter().take(limit).collect();
  records.into_iter().enumerate().filter(|(i, _)| kept.contains(i)).map(|(_, r)| r).collect()
}

/// Selects the most important records when there are more than a digest may carry.
pub struct Ranker<'a> {
  summarizer: &'a dyn Summarizer,
  limit:      usize,
}

impl<'a> Ranker<'a> {
  /// Creates a ranker keeping at most `limit` records.
  pub fn new(summarizer: &'a dyn Summarizer, limit: usize) -> Self { Self { summarizer, limit } }

  /// Maximum number of records kept.
  pub fn limit(&self) -> usize { self.limit }

  /// Returns at most `limit` records out of `records`, which must be ordered newest first.
  ///
  /// If the model cannot be reached or its reply is unusable, the newest records are kept.
  pub async fn select(&self, records: Vec<ItemRecord>) -> Vec<ItemRecord> {
    if records.len() <= self.limit {
      return records;
    }

    let reply = self.summarizer.summarize(RANKING_INSTRUCTION, &ranking_prompt(&records)).await;
    match reply.and_then(|reply| parse_scores(&reply, records.len())) {
      Ok(scores) => {
        debug!("Ranked {} record(s), keeping {}", records.len(), self.limit);
        keep_top(records, &scores, self.limit)
      },
      Err(e) => {
        warn!("Ranking failed, keeping the {} newest record(s): {e}", self.limit);
        records.into_iter().take(self.limit).collect()
      },
    }
  }
}
