//! Paginated client for the vulnerability intelligence API.

use anyhow::Context;
use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::aggregate::retry_delay;
use crate::config::FetchProfile;
use crate::upstream::json::parse_json_with_context;
use crate::upstream::middleware::TransactionLogger;
use crate::upstream::response::check_status;
use crate::upstream::{RawResponse, UpstreamError};
use crate::utils::fmt_duration;

/// Recently published, remotely exploitable, publicly exploited, with a fix.
pub const FIXED_FILTERS: &[(&str, &str)] = &[
    ("published_after", "-14d"),
    ("exploit", "public"),
    ("solution", "change_default,patch,upgrade,workaround"),
    ("location", "remote"),
];

/// Safety stop for runaway pagination.
pub const MAX_PAGES: u32 = 100;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum VulnFetchError {
    #[error("vulnerability request failed on page {page}: {source}")]
    Upstream {
        page: u32,
        #[source]
        source: UpstreamError,
    },
    #[error("unexpected vulnerability response on page {page}: {reason}")]
    Shape { page: u32, reason: String },
}

/// Fetches one page of the listing.
#[async_trait]
pub trait VulnTransport: Send + Sync {
    async fn page(&self, from: u64, size: u32) -> Result<RawResponse, UpstreamError>;
}

pub struct VulnClient {
    http: ClientWithMiddleware,
    endpoint: Url,
    token: String,
}

impl VulnClient {
    /// `base` is the API root; `/vulnerabilities` is appended.
    pub fn new(base: &Url, token: String, request_timeout: Duration) -> anyhow::Result<Self> {
        let endpoint = Url::parse(&format!(
            "{}/vulnerabilities",
            base.as_str().trim_end_matches('/')
        ))
        .context("Failed to build vulnerability endpoint URL")?;

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(request_timeout + Duration::from_secs(5))
            .user_agent(concat!("keyword-pulse/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build vulnerability HTTP client")?;

        Ok(Self {
            http: ClientBuilder::new(client).with(TransactionLogger).build(),
            endpoint,
            token,
        })
    }
}

impl std::fmt::Debug for VulnClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulnClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl VulnTransport for VulnClient {
    async fn page(&self, from: u64, size: u32) -> Result<RawResponse, UpstreamError> {
        let from = from.to_string();
        let size = size.to_string();
        let mut query: Vec<(&str, &str)> = FIXED_FILTERS.to_vec();
        query.push(("from", from.as_str()));
        query.push(("size", size.as_str()));

        let response = self
            .http
            .get(self.endpoint.clone())
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&query)
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

/// Every item the listing returned, in page order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VulnListing {
    pub items: Vec<Value>,
    /// Total reported by the first page, when it carried one.
    pub total: Option<u64>,
    pub pages: u32,
    /// Stopped at [`MAX_PAGES`] or the time budget with more results possibly left.
    pub truncated: bool,
}

/// Walk the listing page by page until one of the stop conditions holds.
///
/// Each page goes through the same retry table as count queries. The first
/// page that still fails aborts the whole fetch. Running out of the profile's
/// budget keeps what was fetched and marks the listing truncated.
pub async fn fetch_all(
    transport: &dyn VulnTransport,
    profile: &FetchProfile,
    page_size: u32,
) -> Result<VulnListing, VulnFetchError> {
    let page_size = page_size.max(1);
    let started = Instant::now();
    let mut listing = VulnListing::default();

    loop {
        let page = listing.pages + 1;
        let from = u64::from(listing.pages) * u64::from(page_size);
        let json = fetch_page(transport, profile, page, from, page_size).await?;

        let items = page_items(&json).map_err(|reason| VulnFetchError::Shape { page, reason })?;
        let returned = items.len();
        listing.items.extend(items.iter().cloned());
        listing.pages = page;

        if page == 1 {
            listing.total = read_total(&json);
            if listing.total.is_none() {
                debug!("vulnerability listing carried no total");
            }
        }
        debug!(
            page,
            returned,
            fetched = listing.items.len(),
            total = listing.total,
            "vulnerability page fetched"
        );

        if listing.total == Some(0) {
            break;
        }
        if let Some(total) = listing.total
            && listing.items.len() as u64 >= total
        {
            break;
        }
        if returned < page_size as usize {
            break;
        }
        if page >= MAX_PAGES {
            warn!(
                max_pages = MAX_PAGES,
                fetched = listing.items.len(),
                "page limit reached, results may be incomplete"
            );
            listing.truncated = true;
            break;
        }

        tokio::time::sleep(profile.pacing).await;

        if let Some(budget) = profile.budget
            && started.elapsed() >= budget
        {
            warn!(
                budget = fmt_duration(budget),
                fetched = listing.items.len(),
                "vulnerability listing budget exhausted, results may be incomplete"
            );
            listing.truncated = true;
            break;
        }
    }

    info!(
        items = listing.items.len(),
        pages = listing.pages,
        "vulnerability listing fetched"
    );
    Ok(listing)
}

async fn fetch_page(
    transport: &dyn VulnTransport,
    profile: &FetchProfile,
    page: u32,
    from: u64,
    size: u32,
) -> Result<Value, VulnFetchError> {
    let policy = &profile.retry;
    let mut attempt = 1;

    loop {
        let request = transport.page(from, size);
        let outcome = match tokio::time::timeout(policy.request_timeout, request).await {
            Ok(Ok(raw)) => check_status(&raw).and_then(|()| {
                parse_json_with_context::<Value>(&raw.body)
                    .map_err(|e| UpstreamError::Parse(e.to_string()))
            }),
            Ok(Err(error)) => Err(error),
            Err(_elapsed) => Err(UpstreamError::Timeout(policy.request_timeout)),
        };

        let error = match outcome {
            Ok(json) => return Ok(json),
            Err(error) => error,
        };

        match retry_delay(policy, attempt, &error) {
            Some(delay) => {
                warn!(
                    page,
                    attempt,
                    kind = error.kind(),
                    status = error.status(),
                    delay_ms = delay.as_millis() as u64,
                    "vulnerability page failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            None => return Err(VulnFetchError::Upstream { page, source: error }),
        }
    }
}

/// Items live under `results`, else `data`, else `hits.hits`.
fn page_items(json: &Value) -> Result<&[Value], String> {
    if let Some(results) = json.get("results").filter(|v| !v.is_null()) {
        return results
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| "'results' is not a list".to_string());
    }
    if let Some(data) = json["data"].as_array() {
        return Ok(data);
    }
    if let Some(hits) = json["hits"]["hits"].as_array() {
        return Ok(hits);
    }
    if json.get("data").is_some() || json.get("hits").is_some() {
        return Err("no item list under 'results', 'data' or 'hits.hits'".to_string());
    }
    Ok(&[])
}

/// `total_hits`, else `total`; a number, numeric string, or `{ "value": n }`.
fn read_total(json: &Value) -> Option<u64> {
    let raw = json.get("total_hits").or_else(|| json.get("total"))?;
    let raw = raw.get("value").unwrap_or(raw);
    raw.as_u64()
        .or_else(|| raw.as_str().and_then(|s| s.trim().parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn items_from_each_shape() {
        assert_eq!(page_items(&json!({"results": [1, 2]})).unwrap().len(), 2);
        assert_eq!(page_items(&json!({"data": [1]})).unwrap().len(), 1);
        assert_eq!(page_items(&json!({"hits": {"hits": [1, 2, 3]}})).unwrap().len(), 3);
        assert!(page_items(&json!({})).unwrap().is_empty());
    }

    #[test]
    fn null_results_fall_through_to_other_shapes() {
        assert_eq!(
            page_items(&json!({"results": null, "data": [1, 2]})).unwrap().len(),
            2
        );
        assert_eq!(
            page_items(&json!({"results": null, "hits": {"hits": [1]}})).unwrap().len(),
            1
        );
        assert!(page_items(&json!({"results": null})).unwrap().is_empty());
    }

    #[test]
    fn non_list_items_are_rejected() {
        assert!(page_items(&json!({"results": {"id": 1}})).is_err());
        assert!(page_items(&json!({"data": "nope"})).is_err());
    }

    #[test]
    fn total_shapes() {
        assert_eq!(read_total(&json!({"total_hits": 12})), Some(12));
        assert_eq!(read_total(&json!({"total": "40"})), Some(40));
        assert_eq!(read_total(&json!({"total": {"value": 7}})), Some(7));
        assert_eq!(read_total(&json!({"total_hits": 3, "total": 9})), Some(3));
        assert_eq!(read_total(&json!({"total": "many"})), None);
        assert_eq!(read_total(&json!({})), None);
    }
}
