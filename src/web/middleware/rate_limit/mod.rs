//! Inbound HTTP rate limiting with per-IP token buckets.
//!
//! Two layers evaluated together (longest wait wins):
//!
//! 1. **Global per-IP** -- burst (5s) + sustained (1min) on every `/api/` route
//! 2. **Export routes** -- tighter sustained + long-term (30min) budgets on
//!    endpoints that fan out into many upstream queries
//!
//! Health checks are never limited. Requests whose client IP cannot be
//! resolved are let through. Buckets that have refilled are dropped by
//! [`prune_periodically`] so the per-IP maps do not grow without bound.

use crate::web::middleware::client_ip;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter, clock::Clock};
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};
use tracing::{debug, warn};

const SUSTAINED: Duration = Duration::from_secs(60);
const BURST: Duration = Duration::from_secs(5);
const LONG: Duration = Duration::from_secs(30 * 60);

/// How often refilled per-IP buckets are dropped.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteClass {
    Exempt,
    Standard,
    /// Report, bulk and bundle: each request can cost hundreds of upstream calls.
    Export,
}

fn classify_route(path: &str) -> RouteClass {
    match path {
        "/api/health" => RouteClass::Exempt,
        "/api/mentions/report" | "/api/mentions/bulk" | "/api/stix/bundle" => RouteClass::Export,
        _ if path.starts_with("/api/") => RouteClass::Standard,
        _ => RouteClass::Exempt,
    }
}

/// Request counts allowed per window.
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub global_burst: u32,
    pub global_sustained: u32,
    pub export_sustained: u32,
    pub export_long: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            global_burst: 15,
            global_sustained: 120,
            export_sustained: 6,
            export_long: 40,
        }
    }
}

pub struct RateLimitState {
    global_burst: DefaultKeyedRateLimiter<IpAddr>,
    global_sustained: DefaultKeyedRateLimiter<IpAddr>,
    export_sustained: DefaultKeyedRateLimiter<IpAddr>,
    export_long: DefaultKeyedRateLimiter<IpAddr>,
}

/// Quota helper: `count` requests per `period` with burst = count.
fn quota(count: u32, period: Duration) -> Quota {
    let burst = NonZeroU32::new(count).unwrap_or(NonZeroU32::MIN);
    Quota::with_period(period / burst.get())
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

impl RateLimitState {
    pub fn new() -> Self {
        Self::with_limits(RateLimits::default())
    }

    pub fn with_limits(limits: RateLimits) -> Self {
        Self {
            global_burst: RateLimiter::keyed(quota(limits.global_burst, BURST)),
            global_sustained: RateLimiter::keyed(quota(limits.global_sustained, SUSTAINED)),
            export_sustained: RateLimiter::keyed(quota(limits.export_sustained, SUSTAINED)),
            export_long: RateLimiter::keyed(quota(limits.export_long, LONG)),
        }
    }

    fn limiters(&self) -> [&DefaultKeyedRateLimiter<IpAddr>; 4] {
        [
            &self.global_burst,
            &self.global_sustained,
            &self.export_sustained,
            &self.export_long,
        ]
    }

    /// Number of per-IP buckets currently held across every limiter.
    pub fn tracked(&self) -> usize {
        self.limiters().iter().map(|limiter| limiter.len()).sum()
    }

    /// Drop buckets that are back to full; returns how many are left.
    pub fn prune(&self) -> usize {
        for limiter in self.limiters() {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
        self.tracked()
    }

    /// Check all applicable limits. Returns `Err(retry_after_secs)` with the
    /// longest wait when any of them rejects.
    fn check(&self, ip: IpAddr, path: &str) -> Result<(), u64> {
        let limiters: &[&DefaultKeyedRateLimiter<IpAddr>] = match classify_route(path) {
            RouteClass::Exempt => return Ok(()),
            RouteClass::Standard => &[&self.global_burst, &self.global_sustained],
            RouteClass::Export => &[
                &self.global_burst,
                &self.global_sustained,
                &self.export_sustained,
                &self.export_long,
            ],
        };

        let now = governor::clock::DefaultClock::default().now();
        let max_wait = limiters
            .iter()
            .filter_map(|limiter| limiter.check_key(&ip).err())
            .map(|not_until| not_until.wait_time_from(now))
            .max();

        match max_wait {
            Some(wait) => Err(wait.as_secs().max(1)),
            None => Ok(()),
        }
    }
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedRateLimitState = Arc<RateLimitState>;

/// Prune `state` every [`PRUNE_INTERVAL`] until `cancel` fires.
pub async fn prune_periodically(state: SharedRateLimitState, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let remaining = state.prune();
                debug!(remaining, "pruned rate limit buckets");
            }
        }
    }
}

// -- Tower Layer + Service --

#[derive(Clone)]
pub struct RateLimitLayer {
    state: SharedRateLimitState,
}

impl RateLimitLayer {
    pub fn new(state: SharedRateLimitState) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            state: self.state.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    state: SharedRateLimitState,
}

impl<S, ResBody> Service<Request> for RateLimitService<S>
where
    S: Service<Request, Response = Response<ResBody>> + Send + Clone + 'static,
    S::Future: Send + 'static,
    S::Error: std::fmt::Debug + Send,
    ResBody: Send + 'static,
    Body: Into<ResBody>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let Some(ip) = client_ip::resolve(req.headers(), req.extensions()) else {
            return Box::pin(self.inner.call(req));
        };

        let path = req.uri().path().to_string();
        match self.state.check(ip, &path) {
            Ok(()) => Box::pin(self.inner.call(req)),
            Err(retry_after) => {
                warn!(
                    client_ip = %ip,
                    path = %path,
                    retry_after_secs = retry_after,
                    "rate limit exceeded"
                );
                let resp = rate_limit_response(retry_after).map(Into::into);
                Box::pin(async move { Ok(resp) })
            }
        }
    }
}

fn rate_limit_response(retry_after: u64) -> Response<Body> {
    let body = serde_json::json!({
        "code": "RATE_LIMITED",
        "message": format!("Too many requests. Retry after {retry_after} seconds."),
        "details": null,
    });
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
    response
        .headers_mut()
        .insert("content-type", HeaderValue::from_static("application/json"));
    response
        .headers_mut()
        .insert("retry-after", HeaderValue::from(retry_after));
    response
}
