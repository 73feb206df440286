//! Classification of raw upstream responses into counts or errors.

use serde_json::Value;

use crate::upstream::errors::UpstreamError;
use crate::upstream::json::{excerpt, parse_json_with_context};

/// Longest slice of an error body carried into error messages.
const DETAIL_LIMIT: usize = 200;

/// What came back over the wire, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Turn one upstream answer into a count, or an error saying why not.
pub fn classify(response: &RawResponse) -> Result<u64, UpstreamError> {
    check_status(response)?;
    let json: Value =
        parse_json_with_context(&response.body).map_err(|e| UpstreamError::Parse(e.to_string()))?;
    Ok(extract_total(&json))
}

/// Map a non-2xx status to its error class; 2xx passes through.
pub fn check_status(response: &RawResponse) -> Result<(), UpstreamError> {
    match response.status {
        200..=299 => Ok(()),
        429 => Err(UpstreamError::RateLimited {
            detail: error_detail(&response.body),
        }),
        status @ 500..=599 => Err(UpstreamError::Server {
            status,
            detail: error_detail(&response.body),
        }),
        status => Err(UpstreamError::Client {
            status,
            detail: error_detail(&response.body),
        }),
    }
}

/// Read the match total, preferring `total.value`, then `hits.total`.
///
/// `hits.total` may be a bare number or an object with a `value`. A body with
/// neither shape counts as zero.
pub fn extract_total(json: &Value) -> u64 {
    if let Some(value) = json["total"]["value"].as_u64() {
        return value;
    }

    let hits_total = &json["hits"]["total"];
    hits_total
        .as_u64()
        .or_else(|| hits_total["value"].as_u64())
        .unwrap_or(0)
}

/// Best human-readable explanation from an error body.
///
/// JSON bodies are searched for `errors[0].detail`, then `message`; anything
/// else (plain text, HTML) is excerpted.
pub fn error_detail(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        if let Some(detail) = json["errors"][0]["detail"].as_str() {
            return excerpt(detail, DETAIL_LIMIT);
        }
        if let Some(message) = json["message"].as_str() {
            return excerpt(message, DETAIL_LIMIT);
        }
    }

    if body.trim().is_empty() {
        return "(empty body)".to_string();
    }
    excerpt(body, DETAIL_LIMIT)
}
