//! Scripted transports shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use keyword_pulse::stix::VulnTransport;
use keyword_pulse::upstream::{RawResponse, SearchPayload, SearchTransport, UpstreamError};

pub fn total(n: u64) -> RawResponse {
    RawResponse::new(200, format!(r#"{{"total": {{"value": {n}, "relation": "eq"}}}}"#))
}

pub fn status(code: u16) -> RawResponse {
    RawResponse::new(code, format!(r#"{{"message": "status {code}"}}"#))
}

/// Hands out queued responses in order, then `fallback` forever.
pub struct ScriptedSearch {
    queue: Mutex<VecDeque<Result<RawResponse, UpstreamError>>>,
    fallback: RawResponse,
    seen: Mutex<Vec<SearchPayload>>,
}

impl ScriptedSearch {
    pub fn new(responses: impl IntoIterator<Item = RawResponse>) -> Self {
        Self::with_outcomes(responses.into_iter().map(Ok))
    }

    pub fn with_outcomes(
        outcomes: impl IntoIterator<Item = Result<RawResponse, UpstreamError>>,
    ) -> Self {
        Self {
            queue: Mutex::new(outcomes.into_iter().collect()),
            fallback: total(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, fallback: RawResponse) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn queries(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.query.clone())
            .collect()
    }
}

#[async_trait]
impl SearchTransport for ScriptedSearch {
    async fn search(&self, payload: &SearchPayload) -> Result<RawResponse, UpstreamError> {
        self.seen.lock().unwrap().push(payload.clone());
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// Accepts every call and never answers.
#[derive(Default)]
pub struct HungSearch {
    calls: AtomicUsize,
}

impl HungSearch {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchTransport for HungSearch {
    async fn search(&self, _payload: &SearchPayload) -> Result<RawResponse, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// Answers `total(1)` after sleeping `delay` on the tokio clock.
pub struct SlowSearch {
    delay: Duration,
    calls: AtomicUsize,
}

impl SlowSearch {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchTransport for SlowSearch {
    async fn search(&self, _payload: &SearchPayload) -> Result<RawResponse, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(total(1))
    }
}

/// Answers each query with a function of its query string.
pub struct PerTermSearch<F>(pub F);

#[async_trait]
impl<F> SearchTransport for PerTermSearch<F>
where
    F: Fn(&str) -> RawResponse + Send + Sync,
{
    async fn search(&self, payload: &SearchPayload) -> Result<RawResponse, UpstreamError> {
        Ok((self.0)(&payload.query))
    }
}

/// Vulnerability pages in order; records the `from` offset of each request.
pub struct ScriptedVulns {
    pages: Mutex<VecDeque<RawResponse>>,
    offsets: Mutex<Vec<(u64, u32)>>,
}

impl ScriptedVulns {
    pub fn new(pages: impl IntoIterator<Item = RawResponse>) -> Self {
        Self {
            pages: Mutex::new(pages.into_iter().collect()),
            offsets: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(u64, u32)> {
        self.offsets.lock().unwrap().clone()
    }
}

#[async_trait]
impl VulnTransport for ScriptedVulns {
    async fn page(&self, from: u64, size: u32) -> Result<RawResponse, UpstreamError> {
        self.offsets.lock().unwrap().push((from, size));
        Ok(self
            .pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| RawResponse::new(200, r#"{"results": []}"#)))
    }
}
