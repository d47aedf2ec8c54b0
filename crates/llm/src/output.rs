//! Model output parsing
//!
//! Small models wrap JSON in markdown fences or add chatter around it.
//! These helpers pull the payload out and report a tagged reason when the
//! output cannot be used, so callers pick their fallback explicitly.

use serde::de::DeserializeOwned;
use thiserror::Error;

/// Why a completion could not be interpreted
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelOutputError {
    #[error("empty response")]
    EmptyResponse,

    #[error("invalid JSON: {reason}")]
    InvalidJson { reason: String, raw: String },

    #[error("unexpected shape: {0}")]
    UnexpectedShape(String),

    #[error("unknown value: {0}")]
    UnknownValue(String),

    /// Well-formed reply that names nothing usable
    #[error("empty selection: {0}")]
    EmptySelection(String),
}

impl ModelOutputError {
    /// Short tag for log fields
    pub fn tag(&self) -> &'static str {
        match self {
            ModelOutputError::EmptyResponse => "empty_response",
            ModelOutputError::InvalidJson { .. } => "invalid_json",
            ModelOutputError::UnexpectedShape(_) => "unexpected_shape",
            ModelOutputError::UnknownValue(_) => "unknown_value",
            ModelOutputError::EmptySelection(_) => "empty_selection",
        }
    }
}

impl From<ModelOutputError> for campus_guide_core::Error {
    fn from(err: ModelOutputError) -> Self {
        campus_guide_core::Error::MalformedOutput(err.to_string())
    }
}

/// Remove a surrounding markdown code fence (```json ... ```), if any
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string ("json", "JSON", ...) up to the first newline
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Locate the first balanced JSON object or array in `text`
fn find_json_span(text: &str) -> Option<&str> {
    let start = text.find(|c: char| c == '{' || c == '[')?;
    let (open, close) = match text.as_bytes()[start] {
        b'{' => (b'{', b'}'),
        _ => (b'[', b']'),
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, byte) in text.as_bytes()[start..].iter().enumerate() {
        if in_string {
            match *byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {},
            }
            continue;
        }
        match *byte {
            b'"' => in_string = true,
            b if b == open => depth += 1,
            b if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            },
            _ => {},
        }
    }
    None
}

/// Parse a JSON value from model output
///
/// Tries the fence-stripped text first, then the first balanced JSON span
/// inside it.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, ModelOutputError> {
    let body = strip_code_fences(raw);
    if body.is_empty() {
        return Err(ModelOutputError::EmptyResponse);
    }

    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(first) => find_json_span(body)
            .and_then(|span| serde_json::from_str(span).ok())
            .ok_or_else(|| ModelOutputError::InvalidJson {
                reason: first.to_string(),
                raw: raw.to_string(),
            }),
    }
}
