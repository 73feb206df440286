//! JSON error responses for the HTTP API.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorCode {
    BadRequest,
    InvalidWindow,
    InvalidUpload,
    NotFound,
    /// An upstream service could not be reached or refused every attempt.
    UpstreamUnavailable,
    /// Nothing could be retrieved before the request's time ran out.
    UpstreamTimeout,
    /// The route depends on configuration that is not set.
    NotConfigured,
    InternalError,
}

impl ApiErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            ApiErrorCode::BadRequest | ApiErrorCode::InvalidWindow | ApiErrorCode::InvalidUpload => {
                StatusCode::BAD_REQUEST
            }
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            ApiErrorCode::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiErrorCode::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::BadRequest, message)
    }

    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::UpstreamUnavailable, message)
    }

    pub fn not_configured(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::NotConfigured, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::InternalError, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_screaming() {
        let err = ApiError::not_configured("VULN_API_URL is not set");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "NOT_CONFIGURED");
        assert_eq!(json["details"], Value::Null);
        assert_eq!(err.code.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
