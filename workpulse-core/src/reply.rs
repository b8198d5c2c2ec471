//! Extraction of summary, verdict and score from a model reply.
//!
//! Structured replies (JSON matching [`verdict_schema`]) are decoded directly.
//! Anything else goes through pattern extraction over the literal
//! `SUMMARY: ...\nVERDICT: ...\nSCORE: n/10` format.

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

/// Longest excerpt of a rejected reply carried in the error message.
const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub summary: String,
    pub verdict: Option<String>,
    /// 1–10; anything outside that range is dropped.
    pub score: Option<u8>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReplyError {
    #[error("Model returned an empty reply")]
    Empty,

    #[error("Unparseable model response: {excerpt}")]
    Unrecognized { excerpt: String },
}

#[derive(Debug, Deserialize)]
struct StructuredVerdict {
    summary: String,
    verdict: String,
    score: Option<i64>,
}

/// JSON schema sent as the `response_format` when structured output is on.
pub fn verdict_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "summary": { "type": "string" },
            "verdict": {
                "type": "string",
                "description": "productive, unproductive or mixed"
            },
            "score": {
                "type": "integer",
                "description": "Productivity score from 1 (none) to 10 (perfect)"
            }
        },
        "required": ["summary", "verdict", "score"],
        "additionalProperties": false
    })
}

/// Parse a reply, preferring the structured form.
pub fn parse_reply(text: &str) -> Result<ParsedReply, ReplyError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ReplyError::Empty);
    }
    if let Some(parsed) = parse_structured(trimmed) {
        return Ok(parsed);
    }
    parse_text(trimmed)
}

/// Decode a JSON reply. Returns `None` when the text is not a verdict object.
pub fn parse_structured(text: &str) -> Option<ParsedReply> {
    let body = strip_code_fence(text.trim());
    let decoded: StructuredVerdict = serde_json::from_str(body).ok()?;
    let verdict = decoded.verdict.trim();
    Some(ParsedReply {
        summary: decoded.summary.trim().to_string(),
        verdict: (!verdict.is_empty()).then(|| verdict.to_string()),
        score: decoded.score.and_then(score_in_range),
    })
}

/// Best-effort extraction from the literal text format.
///
/// `VERDICT` runs to the end of its line, `SCORE` is the 1–2 digits before
/// `/10`. A missing field comes back as `None`; a reply with none of the three
/// markers is rejected.
pub fn parse_text(text: &str) -> Result<ParsedReply, ReplyError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ReplyError::Empty);
    }

    let summary = capture(r"(?s)SUMMARY:\s*(.*?)\s*(?:VERDICT:|SCORE:|\z)", text);
    let verdict = capture(r"VERDICT:[ \t]*([^\r\n]*)", text);
    let score = capture(r"SCORE:\s*(\d{1,2})/10", text);

    if summary.is_none() && verdict.is_none() && score.is_none() {
        return Err(ReplyError::Unrecognized {
            excerpt: text.chars().take(EXCERPT_CHARS).collect(),
        });
    }

    let score = score.and_then(|s| s.parse::<i64>().ok()).and_then(score_in_range);
    if score.is_none() {
        tracing::debug!("Model reply carried no usable score");
    }

    Ok(ParsedReply {
        summary: summary
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| text.to_string()),
        verdict: verdict.filter(|v| !v.is_empty()),
        score,
    })
}

fn capture(pattern: &str, text: &str) -> Option<String> {
    let re = Regex::new(pattern).ok()?;
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn score_in_range(score: i64) -> Option<u8> {
    if (1..=10).contains(&score) {
        Some(score as u8)
    } else {
        tracing::warn!(score, "Model score outside 1-10, dropping");
        None
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_format_extracts_all_fields() {
        let parsed = parse_reply("SUMMARY: S\nVERDICT: V\nSCORE: 7/10").unwrap();
        assert_eq!(parsed.summary, "S");
        assert_eq!(parsed.verdict.as_deref(), Some("V"));
        assert_eq!(parsed.score, Some(7));
    }

    #[test]
    fn test_missing_score_line_keeps_summary_and_verdict() {
        let parsed = parse_reply("SUMMARY: Worked in Excel\nVERDICT: productive").unwrap();
        assert_eq!(parsed.summary, "Worked in Excel");
        assert_eq!(parsed.verdict.as_deref(), Some("productive"));
        assert_eq!(parsed.score, None);
    }

    #[test]
    fn test_verdict_stops_at_line_break() {
        let parsed =
            parse_text("SUMMARY: a\nVERDICT: mixed\r\nSCORE: 10/10\nExtra commentary").unwrap();
        assert_eq!(parsed.verdict.as_deref(), Some("mixed"));
        assert_eq!(parsed.score, Some(10));
    }

    #[test]
    fn test_multiline_summary_runs_to_verdict_marker() {
        let text = "SUMMARY: Morning in VS Code.\nAfternoon on YouTube.\nVERDICT: mixed\nSCORE: 5/10";
        let parsed = parse_text(text).unwrap();
        assert_eq!(parsed.summary, "Morning in VS Code.\nAfternoon on YouTube.");
    }

    #[test]
    fn test_score_requires_slash_ten() {
        let parsed = parse_text("SUMMARY: s\nVERDICT: v\nSCORE: 7 out of 10").unwrap();
        assert_eq!(parsed.score, None);
    }

    #[test]
    fn test_out_of_range_score_dropped() {
        let parsed = parse_text("SUMMARY: s\nVERDICT: v\nSCORE: 0/10").unwrap();
        assert_eq!(parsed.score, None);
        let parsed = parse_text("SUMMARY: s\nVERDICT: v\nSCORE: 42/10").unwrap();
        assert_eq!(parsed.score, None);
    }

    #[test]
    fn test_no_summary_marker_uses_whole_reply() {
        let parsed = parse_text("The employee was idle.\nVERDICT: unproductive").unwrap();
        assert_eq!(parsed.summary, "The employee was idle.\nVERDICT: unproductive");
        assert_eq!(parsed.verdict.as_deref(), Some("unproductive"));
    }

    #[test]
    fn test_reply_without_markers_is_unparseable() {
        let err = parse_reply("I cannot help with that request.").unwrap_err();
        assert!(matches!(err, ReplyError::Unrecognized { .. }));
        assert!(err.to_string().contains("I cannot help"));
    }

    #[test]
    fn test_empty_reply_is_error() {
        assert_eq!(parse_reply("   \n").unwrap_err(), ReplyError::Empty);
    }

    #[test]
    fn test_structured_reply_decoded() {
        let parsed = parse_reply(
            r#"{"summary": "Reading emails and LinkedIn", "verdict": "productive", "score": 8}"#,
        )
        .unwrap();
        assert_eq!(parsed.summary, "Reading emails and LinkedIn");
        assert_eq!(parsed.verdict.as_deref(), Some("productive"));
        assert_eq!(parsed.score, Some(8));
    }

    #[test]
    fn test_structured_reply_in_code_fence() {
        let parsed = parse_structured(
            "```json\n{\"summary\": \"s\", \"verdict\": \"mixed\", \"score\": 6}\n```",
        )
        .unwrap();
        assert_eq!(parsed.score, Some(6));
    }

    #[test]
    fn test_structured_reply_with_bad_score() {
        let parsed =
            parse_structured(r#"{"summary": "s", "verdict": "mixed", "score": 11}"#).unwrap();
        assert_eq!(parsed.score, None);
    }

    #[test]
    fn test_json_without_verdict_fields_falls_back_to_text() {
        assert!(parse_structured(r#"{"answer": "SUMMARY: s"}"#).is_none());
    }

    #[test]
    fn test_excerpt_is_bounded() {
        let long = "x".repeat(1000);
        match parse_text(&long).unwrap_err() {
            ReplyError::Unrecognized { excerpt } => assert_eq!(excerpt.len(), EXCERPT_CHARS),
            other => panic!("unexpected {:?}", other),
        }
    }
}
