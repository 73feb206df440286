//! Search API transport.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use std::time::Duration;
use url::Url;

use crate::upstream::errors::UpstreamError;
use crate::upstream::middleware::TransactionLogger;
use crate::upstream::query::SearchPayload;
use crate::upstream::response::RawResponse;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Executes one search request and hands back the raw answer.
///
/// Only transport failures are errors here; every HTTP status, including
/// 4xx/5xx, comes back as a [`RawResponse`] for the fetcher to classify.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    async fn search(&self, payload: &SearchPayload) -> Result<RawResponse, UpstreamError>;
}

/// Bearer-authenticated client for the upstream search endpoint.
pub struct SearchClient {
    http: ClientWithMiddleware,
    url: Url,
    token: String,
}

impl SearchClient {
    /// `request_timeout` is a backstop; the fetcher enforces its own per-attempt timeout.
    pub fn new(url: Url, token: String, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(request_timeout + Duration::from_secs(5))
            .user_agent(concat!("keyword-pulse/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build search HTTP client")?;

        let http = ClientBuilder::new(client).with(TransactionLogger).build();

        Ok(Self { http, url, token })
    }
}

impl std::fmt::Debug for SearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchClient")
            .field("url", &self.url.as_str())
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl SearchTransport for SearchClient {
    async fn search(&self, payload: &SearchPayload) -> Result<RawResponse, UpstreamError> {
        let response = self
            .http
            .post(self.url.clone())
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::Network(format!("failed to read body: {e}")))?;

        Ok(RawResponse { status, body })
    }
}
