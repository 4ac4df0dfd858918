use std::cmp::Ordering;

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::post::{self, SCORING_MAX_DIMENSION};
use crate::prompts;
use crate::search::Candidate;

const SCORING_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const SCORING_MODEL: &str = "claude-haiku-4-5-20251001";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1000;

/// Scores below this (0-10 scale) are dropped.
pub const MIN_SCORE: f32 = 7.0;
/// Upper bound on references handed to generation.
pub const MAX_SELECTED: usize = 3;
/// Prefix of the fetched list kept when scoring fails.
pub const FALLBACK_COUNT: usize = 3;

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: String,
}

#[derive(Serialize)]
struct ScoringRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ScoringResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
struct ResponseBlock {
    #[serde(default)]
    text: Option<String>,
}

/// One per-image verdict inside the scoring response array.
#[derive(Debug, Deserialize)]
struct ScoreEntry {
    #[serde(default = "invalid_index")]
    index: i64,
    #[serde(default)]
    confidence_score: f32,
    #[serde(default)]
    matched_details: String,
}

fn invalid_index() -> i64 {
    -1
}

pub struct Selector {
    http: reqwest::Client,
    api_key: String,
}

impl Selector {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self { http, api_key }
    }

    /// Rank the fetched candidates by how well they match `subject` and keep
    /// the best few. Scoring is delegated to a vision model; any failure on
    /// that path (transport, HTTP, unparsable output) falls back to the
    /// first `FALLBACK_COUNT` fetched candidates.
    pub async fn select(
        &self,
        candidates: Vec<Candidate>,
        subject: &str,
        min_score: f32,
    ) -> Vec<Candidate> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut blocks = vec![ContentBlock::Text {
            text: prompts::scoring_instructions(subject),
        }];
        let mut valid = Vec::new();
        for (i, candidate) in candidates.iter().enumerate() {
            let Some(data) = &candidate.image_data else {
                continue;
            };
            match post::optimize(data, SCORING_MAX_DIMENSION) {
                Ok((media_type, optimized)) => {
                    blocks.push(ContentBlock::Text {
                        text: prompts::scoring_image_label(
                            valid.len(),
                            candidate.description.as_deref(),
                        ),
                    });
                    blocks.push(ContentBlock::Image {
                        source: ImageSource {
                            kind: "base64",
                            media_type,
                            data: BASE64.encode(&optimized),
                        },
                    });
                    valid.push(i);
                }
                Err(e) => {
                    warn!(url = %candidate.url, error = %e, "skipping undecodable candidate for scoring");
                }
            }
        }
        if valid.is_empty() {
            warn!("no candidate decoded for scoring, using first {FALLBACK_COUNT}");
            return fallback(candidates);
        }
        blocks.push(ContentBlock::Text {
            text: prompts::scoring_epilogue().to_string(),
        });

        if tracing::enabled!(tracing::Level::DEBUG) {
            let prompt_text: String = blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::Image { .. } => None,
                })
                .collect();
            debug!(images = valid.len(), prompt = %prompt_text, "scoring prompt");
        }

        match self.score(blocks).await {
            Ok(text) => match parse_score_array(&text) {
                Some(entries) => apply_scores(candidates, &valid, entries, min_score),
                None => {
                    warn!("no JSON array in scoring response, using first {FALLBACK_COUNT}");
                    fallback(candidates)
                }
            },
            Err(e) => {
                warn!(error = %format!("{e:#}"), "scoring failed, using first {FALLBACK_COUNT}");
                fallback(candidates)
            }
        }
    }

    async fn score(&self, blocks: Vec<ContentBlock>) -> Result<String> {
        let request = ScoringRequest {
            model: SCORING_MODEL,
            max_tokens: MAX_TOKENS,
            messages: vec![Message {
                role: "user",
                content: blocks,
            }],
        };
        let response = self
            .http
            .post(SCORING_ENDPOINT)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .context("scoring request failed")?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .context("scoring response could not be read")?;
        debug!(%status, response = %raw, "scoring response");
        if !status.is_success() {
            bail!("scoring service returned HTTP {status}: {raw}");
        }

        let parsed: ScoringResponse =
            serde_json::from_str(&raw).context("scoring response was not valid JSON")?;
        parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| anyhow!("scoring response contained no text block"))
    }
}

/// Scan free text for the first embedded JSON array; the model's output is
/// not guaranteed to be clean JSON on its own.
fn parse_score_array(text: &str) -> Option<Vec<ScoreEntry>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Keep candidates at or above `min_score`, attach score and rationale,
/// sort best-first, and bound the result. Entry indices address positions
/// in `valid` (the candidates that were actually sent for scoring);
/// anything out of range is ignored.
fn apply_scores(
    candidates: Vec<Candidate>,
    valid: &[usize],
    entries: Vec<ScoreEntry>,
    min_score: f32,
) -> Vec<Candidate> {
    let mut pool: Vec<Option<Candidate>> = candidates.into_iter().map(Some).collect();
    let mut selected = Vec::new();
    for entry in entries {
        if entry.confidence_score < min_score {
            continue;
        }
        let Ok(slot) = usize::try_from(entry.index) else {
            continue;
        };
        let Some(&original) = valid.get(slot) else {
            continue;
        };
        if let Some(mut candidate) = pool[original].take() {
            info!(
                index = slot,
                score = entry.confidence_score,
                details = %entry.matched_details,
                "reference selected"
            );
            candidate.confidence_score = entry.confidence_score;
            candidate.matched_details = Some(entry.matched_details);
            selected.push(candidate);
        }
    }
    selected.sort_by(|a, b| {
        b.confidence_score
            .partial_cmp(&a.confidence_score)
            .unwrap_or(Ordering::Equal)
    });
    selected.truncate(MAX_SELECTED);
    selected
}

fn fallback(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.truncate(FALLBACK_COUNT);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(url: &str) -> Candidate {
        Candidate {
            url: url.into(),
            image_data: Some(vec![1, 2, 3]),
            ..Default::default()
        }
    }

    fn entry(index: i64, score: f32, details: &str) -> ScoreEntry {
        ScoreEntry {
            index,
            confidence_score: score,
            matched_details: details.into(),
        }
    }

    #[test]
    fn parses_array_embedded_in_prose() {
        let text = "Here are my scores:\n[\n  {\"index\": 0, \"confidence_score\": 9, \"matched_details\": \"exploded view\"},\n  {\"index\": 1, \"confidence_score\": 3.5, \"matched_details\": \"packaging only\"}\n]\nHope this helps!";
        let entries = parse_score_array(text).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].index, 0);
        assert_eq!(entries[0].confidence_score, 9.0);
        assert_eq!(entries[1].confidence_score, 3.5);
        assert_eq!(entries[1].matched_details, "packaging only");
    }

    #[test]
    fn entries_tolerate_missing_fields() {
        let entries = parse_score_array(r#"[{"confidence_score": 8}]"#).unwrap();
        assert_eq!(entries[0].index, -1);
        assert_eq!(entries[0].matched_details, "");
    }

    #[test]
    fn text_without_an_array_is_unparsable() {
        assert!(parse_score_array("I cannot score these images.").is_none());
        assert!(parse_score_array("] backwards [").is_none());
        assert!(parse_score_array("[not json]").is_none());
    }

    #[test]
    fn applies_threshold_sorts_and_truncates() {
        let candidates = vec![
            candidate("a"),
            candidate("b"),
            candidate("c"),
            candidate("d"),
        ];
        let valid = [0, 1, 2, 3];
        let entries = vec![
            entry(0, 7.5, "close match"),
            entry(1, 9.0, "best match"),
            entry(2, 2.0, "unrelated"),
            entry(3, 8.0, "good match"),
            entry(9, 10.0, "index out of range"),
            entry(-1, 10.0, "negative index"),
        ];

        let selected = apply_scores(candidates, &valid, entries, MIN_SCORE);
        let urls: Vec<&str> = selected.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["b", "d", "a"]);
        assert_eq!(selected[0].confidence_score, 9.0);
        assert_eq!(selected[0].matched_details.as_deref(), Some("best match"));
    }

    #[test]
    fn indices_address_the_scored_subset() {
        // Candidate 0 was not scored (e.g. undecodable), so index 0 in the
        // response means the second fetched candidate.
        let candidates = vec![candidate("skipped"), candidate("scored")];
        let selected = apply_scores(candidates, &[1], vec![entry(0, 9.0, "ok")], MIN_SCORE);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].url, "scored");
    }

    #[test]
    fn duplicate_indices_select_a_candidate_once() {
        let candidates = vec![candidate("a")];
        let entries = vec![entry(0, 9.0, "first"), entry(0, 8.0, "again")];
        let selected = apply_scores(candidates, &[0], entries, MIN_SCORE);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].matched_details.as_deref(), Some("first"));
    }

    #[test]
    fn all_below_threshold_selects_nothing() {
        let candidates = vec![candidate("a"), candidate("b")];
        let entries = vec![entry(0, 5.0, ""), entry(1, 6.9, "")];
        assert!(apply_scores(candidates, &[0, 1], entries, MIN_SCORE).is_empty());
    }

    #[test]
    fn fallback_keeps_a_deterministic_prefix() {
        let candidates = vec![
            candidate("a"),
            candidate("b"),
            candidate("c"),
            candidate("d"),
            candidate("e"),
        ];
        let kept = fallback(candidates);
        let urls: Vec<&str> = kept.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["a", "b", "c"]);

        assert!(fallback(Vec::new()).is_empty());
        assert_eq!(fallback(vec![candidate("only")]).len(), 1);
    }
}
