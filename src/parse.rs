//! Model-response parsing with code-fence fallback.
//!
//! Every workflow stage instructs the model to answer with bare JSON, but
//! vision models routinely wrap output in a ```json fence anyway. The parser
//! never assumes the fence is absent: strict parse first, then extract the
//! first fenced block and retry. A response that fails both paths surfaces as
//! [`HeraldError::ParseFailed`] carrying the raw content so the caller can
//! log exactly what the model said.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

use crate::error::HeraldError;

/// First fenced code block, with an optional `json` language tag.
static RE_FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*\n(.*?)```").unwrap());

/// Parse a model response into the expected shape `T`.
pub fn parse_response<T: DeserializeOwned>(raw: &str) -> Result<T, HeraldError> {
    let trimmed = raw.trim();

    if let Ok(parsed) = serde_json::from_str::<T>(trimmed) {
        return Ok(parsed);
    }

    if let Some(captures) = RE_FENCED_BLOCK.captures(trimmed) {
        if let Some(body) = captures.get(1) {
            if let Ok(parsed) = serde_json::from_str::<T>(body.as_str().trim()) {
                return Ok(parsed);
            }
        }
    }

    Err(HeraldError::ParseFailed {
        raw: raw.to_string(),
    })
}
