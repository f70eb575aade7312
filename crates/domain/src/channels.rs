//! Two-channel extraction from delimited model output.
//!
//! The model is instructed to wrap its working notes in
//! `<scratchpad>…</scratchpad>` and the user-facing answer in
//! `<answer>…</answer>`. Extraction is a pure function recomputed from the
//! full accumulated text on every streaming delta: idempotent by
//! construction, and tolerant of an unclosed tag at end-of-stream (the
//! channel then runs to the end of the input). Text outside both tag pairs
//! is discarded and never shown to the user, even when the model violates
//! the format.
//!
//! The same convention carries the external-agent research summary inside
//! a synthetic user message, so replay can re-extract it later.

use serde::{Deserialize, Serialize};

pub const SCRATCHPAD_OPEN: &str = "<scratchpad>";
pub const SCRATCHPAD_CLOSE: &str = "</scratchpad>";
pub const ANSWER_OPEN: &str = "<answer>";
pub const ANSWER_CLOSE: &str = "</answer>";

pub const RESEARCH_OPEN: &str = "<API_Agent_Research>";
pub const RESEARCH_CLOSE: &str = "</API_Agent_Research>";

/// The two-channel decomposition of model output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamedAnswer {
    pub scratchpad: String,
    pub answer: String,
}

impl StreamedAnswer {
    /// Re-wrap the channels in their delimiters, producing the canonical
    /// stored form of an answer message.
    pub fn to_delimited(&self) -> String {
        format!(
            "{SCRATCHPAD_OPEN}{}{SCRATCHPAD_CLOSE}{ANSWER_OPEN}{}{ANSWER_CLOSE}",
            self.scratchpad, self.answer
        )
    }
}

/// Extract both channels from `text`.
///
/// Multiple complete tag pairs per channel concatenate in order. An
/// unclosed pair contributes everything up to end-of-input, minus any
/// trailing fragment that is a prefix of the closing tag (so a
/// half-streamed `</ans` never flashes into the visible value).
pub fn extract_channels(text: &str) -> StreamedAnswer {
    StreamedAnswer {
        scratchpad: extract_channel(text, SCRATCHPAD_OPEN, SCRATCHPAD_CLOSE),
        answer: extract_channel(text, ANSWER_OPEN, ANSWER_CLOSE),
    }
}

/// Whether the answer channel is still open: no opening tag yet, or an
/// opening tag without its close. Drives the "thinking" indicator.
pub fn answer_is_open(text: &str) -> bool {
    match text.rfind(ANSWER_OPEN) {
        None => true,
        Some(pos) => !text[pos..].contains(ANSWER_CLOSE),
    }
}

fn extract_channel(text: &str, open: &str, close: &str) -> String {
    let mut out = String::new();
    let mut rest = text;
    while let Some(start) = rest.find(open) {
        let body = &rest[start + open.len()..];
        match body.find(close) {
            Some(end) => {
                out.push_str(&body[..end]);
                rest = &body[end + close.len()..];
            }
            None => {
                out.push_str(trim_partial_close(body, close));
                break;
            }
        }
    }
    out
}

/// Strip a trailing partial closing tag from an unclosed channel body.
fn trim_partial_close<'a>(body: &'a str, close: &str) -> &'a str {
    for take in (1..close.len()).rev() {
        if body.ends_with(&close[..take]) {
            return &body[..body.len() - take];
        }
    }
    body
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Research summary wrapping
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Wrap a serialized research summary in its delimiter tags.
pub fn wrap_research_summary(json: &str) -> String {
    format!("{RESEARCH_OPEN}{json}{RESEARCH_CLOSE}")
}

/// Recover the research summary JSON from a wrapped message body, if the
/// delimiters are present and well-formed.
pub fn extract_research_summary(content: &str) -> Option<&str> {
    let start = content.find(RESEARCH_OPEN)? + RESEARCH_OPEN.len();
    let end = content[start..].find(RESEARCH_CLOSE)? + start;
    Some(&content[start..end])
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
