//! Web API router construction.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer};

use crate::state::AppState;
use crate::stix::{GENERATOR_TIMEOUT, MAX_PAGES};
use crate::web::error::{ApiError, ApiErrorCode};
use crate::web::middleware::rate_limit::{RateLimitLayer, RateLimitState, SharedRateLimitState};
use crate::web::middleware::request_id::RequestIdLayer;
use crate::web::middleware::security_headers::SecurityHeadersLayer;
use crate::web::{bulk, mentions, status, stix};
use crate::window::WindowSpec;

/// Added on top of the longest run a route group can start, so the run's own
/// budget always ends the request first.
const TIMEOUT_HEADROOM: Duration = Duration::from_secs(5);

/// Cache-Control for every API response. Counts move constantly and exports
/// are per-request.
const NO_STORE: &str = "no-store";

/// Request timeouts per route group, derived from the fetch profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteTimeouts {
    /// Health, status, weekly counts and the generator proxy.
    pub quick: Duration,
    /// Reports, bulk uploads and STIX bundles.
    pub export: Duration,
}

impl RouteTimeouts {
    pub fn for_state(state: &AppState) -> Self {
        let profiles = &state.profiles;
        let longest_window = WindowSpec::LAST_365_DAYS.length as usize;

        let quick = profiles
            .weekly
            .run_limit(WindowSpec::LAST_7_DAYS.length as usize)
            .max(GENERATOR_TIMEOUT);
        let export = profiles
            .report
            .run_limit(longest_window)
            .max(
                profiles
                    .bulk
                    .run_limit(state.max_bulk_terms.saturating_mul(longest_window)),
            )
            .max(profiles.vulnerabilities.run_limit(MAX_PAGES as usize));

        Self {
            quick: quick.saturating_add(TIMEOUT_HEADROOM),
            export: export.saturating_add(TIMEOUT_HEADROOM),
        }
    }
}

/// Creates the web server router
pub fn create_router(app_state: AppState) -> Router {
    create_router_with_limits(app_state, Arc::new(RateLimitState::new()))
}

/// Same as [`create_router`] with a caller-owned rate limit state, so the
/// caller can prune it.
pub fn create_router_with_limits(app_state: AppState, limits: SharedRateLimitState) -> Router {
    let timeouts = RouteTimeouts::for_state(&app_state);

    let quick = Router::new()
        .route("/health", get(status::health))
        .route("/status", get(status::status))
        .route("/mentions/weekly", get(mentions::weekly))
        .route("/stix/generator", get(stix::generator))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::GATEWAY_TIMEOUT,
            timeouts.quick,
        ));

    let exports = Router::new()
        .route("/mentions/report", get(mentions::report))
        .route(
            "/mentions/bulk",
            post(bulk::bulk).layer(DefaultBodyLimit::max(bulk::UPLOAD_LIMIT_BYTES)),
        )
        .route("/stix/bundle", get(stix::bundle))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::GATEWAY_TIMEOUT,
            timeouts.export,
        ));

    let api_router = quick
        .merge(exports)
        .layer(axum::middleware::map_response(timeout_as_json))
        .layer(axum::middleware::map_response(
            |mut resp: Response| async move {
                resp.headers_mut()
                    .insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
                resp
            },
        ))
        .with_state(app_state);

    Router::new()
        .nest("/api", api_router)
        .fallback(not_found)
        .layer(RateLimitLayer::new(limits))
        .layer((
            // Outermost: per-request ID span + severity-proportional response logging.
            RequestIdLayer,
            SecurityHeadersLayer,
            CompressionLayer::new()
                .zstd(true)
                .br(true)
                .gzip(true)
                .quality(tower_http::CompressionLevel::Fastest),
        ))
}

/// The timeout layer answers with an empty 504; give it the API's error body.
async fn timeout_as_json(resp: Response) -> Response {
    if resp.status() == StatusCode::GATEWAY_TIMEOUT
        && !resp.headers().contains_key(header::CONTENT_TYPE)
    {
        return ApiError::new(
            ApiErrorCode::UpstreamTimeout,
            "request did not finish within the route timeout",
        )
        .into_response();
    }
    resp
}

async fn not_found() -> ApiError {
    ApiError::new(ApiErrorCode::NotFound, "No such route")
}
