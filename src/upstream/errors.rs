//! Error types for the upstream search API client.

use std::time::Duration;

/// Why a single upstream count query did not produce a number.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream rate limited the request (429): {detail}")]
    RateLimited { detail: String },
    #[error("upstream server error ({status}): {detail}")]
    Server { status: u16, detail: String },
    #[error("upstream rejected the request ({status}): {detail}")]
    Client { status: u16, detail: String },
    #[error("network error talking to upstream: {0}")]
    Network(String),
    #[error("upstream did not answer within {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("malformed upstream response: {0}")]
    Parse(String),
}

impl UpstreamError {
    /// Rate limits, 5xx, and transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Server { .. } | Self::Network(_) | Self::Timeout(_)
        )
    }

    /// The HTTP status the upstream answered with, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { .. } => Some(429),
            Self::Server { status, .. } | Self::Client { status, .. } => Some(*status),
            Self::Network(_) | Self::Timeout(_) | Self::Parse(_) => None,
        }
    }

    /// Short machine-friendly name, used in logs and CSV trailers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Server { .. } => "server_error",
            Self::Client { .. } => "client_error",
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::Parse(_) => "parse",
        }
    }
}
