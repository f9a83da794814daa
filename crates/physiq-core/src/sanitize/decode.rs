//! Raw model text to a JSON object.

use serde_json::{Map, Value};
use thiserror::Error;

/// Longest slice of the raw response quoted back in a parse error.
const SNIPPET_CHARS: usize = 200;

/// Why a model response could not be turned into a JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Nothing but whitespace (or an empty code fence) came back.
    #[error("model response was empty")]
    Empty,

    #[error("model response is not valid JSON: {snippet}")]
    NotJson { snippet: String },

    #[error("model response is JSON but not an object")]
    NotAnObject,
}

/// Strip a surrounding markdown code fence (```` ```json ... ``` ````), if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) up to the first newline.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Decode a model response into a JSON object.
///
/// Accepts a bare object, a fenced object, or an object embedded in prose
/// (first `{` to last `}`). The Spanish key `recomendaciones` is renamed to
/// `recommendations` at the top level.
pub fn decode_object(raw: &str) -> Result<Value, ParseError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(ParseError::Empty);
    }

    let value = match serde_json::from_str::<Value>(body) {
        Ok(value) => value,
        Err(_) => embedded_object(body).ok_or_else(|| ParseError::NotJson {
            snippet: body.chars().take(SNIPPET_CHARS).collect(),
        })?,
    };

    match value {
        Value::Object(map) => Ok(Value::Object(normalize_keys(map))),
        _ => Err(ParseError::NotAnObject),
    }
}

fn embedded_object(body: &str) -> Option<Value> {
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&body[start..=end])
        .ok()
        .filter(Value::is_object)
}

fn normalize_keys(mut map: Map<String, Value>) -> Map<String, Value> {
    if !map.contains_key("recommendations") {
        if let Some(value) = map.remove("recomendaciones") {
            map.insert("recommendations".to_string(), value);
        }
    }
    map
}
