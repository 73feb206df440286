//! Client for the external STIX bundle generator.

use anyhow::Context;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use std::time::Duration;
use url::Url;

use crate::upstream::middleware::TransactionLogger;

const BUNDLE_PATH: &str = "api/stix_bundle.json";

/// Whole-request timeout for generator calls.
pub const GENERATOR_TIMEOUT: Duration = Duration::from_secs(60);

/// What the generator answered, relayed verbatim.
#[derive(Debug, Clone)]
pub struct GeneratorResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

pub struct GeneratorClient {
    http: ClientWithMiddleware,
    url: Url,
}

impl GeneratorClient {
    pub fn new(base: &Url, timeout: Duration) -> anyhow::Result<Self> {
        let url = Url::parse(&format!(
            "{}/{BUNDLE_PATH}",
            base.as_str().trim_end_matches('/')
        ))
        .context("Failed to build generator URL")?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("keyword-pulse/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build generator HTTP client")?;

        Ok(Self {
            http: ClientBuilder::new(client).with(TransactionLogger).build(),
            url,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn fetch(&self) -> Result<GeneratorResponse, reqwest_middleware::Error> {
        let response = self.http.get(self.url.clone()).send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        Ok(GeneratorResponse {
            status,
            content_type,
            body,
        })
    }
}
