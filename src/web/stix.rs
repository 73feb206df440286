//! STIX bundle routes.

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use tracing::{debug, error, instrument, warn};

use crate::state::AppState;
use crate::stix::{build_bundle, fetch_all};
use crate::web::error::ApiError;

/// Set when pagination hit its page limit.
const TRUNCATED_HEADER: &str = "x-stix-truncated";

/// `GET /api/stix/bundle`
#[instrument(skip_all)]
pub(super) async fn bundle(State(state): State<AppState>) -> Result<Response, ApiError> {
    let Some(vulns) = &state.vulns else {
        return Err(ApiError::not_configured(
            "vulnerability source is not configured; set VULN_API_URL and a token",
        ));
    };

    let listing = fetch_all(
        vulns.as_ref(),
        &state.profiles.vulnerabilities,
        state.vuln_page_size,
    )
    .await
    .map_err(|e| {
        warn!(error = %e, "vulnerability fetch failed");
        ApiError::upstream_unavailable(e.to_string())
    })?;

    let report = build_bundle(&listing.items, Utc::now()).map_err(|e| {
        error!(error = %e, "STIX mapping produced nothing");
        ApiError::internal_error(e.to_string())
    })?;

    let mut response = Json(report.bundle).into_response();
    if listing.truncated {
        response
            .headers_mut()
            .insert(TRUNCATED_HEADER, HeaderValue::from_static("true"));
    }
    Ok(response)
}

/// `GET /api/stix/generator`
///
/// Relays the external generator's answer, status included.
#[instrument(skip_all)]
pub(super) async fn generator(State(state): State<AppState>) -> Result<Response, ApiError> {
    let Some(client) = &state.generator else {
        return Err(ApiError::not_configured("STIX_GENERATOR_URL is not set"));
    };

    debug!(url = %client.url(), "fetching bundle from generator");
    let upstream = client.fetch().await.map_err(|e| {
        warn!(error = %e, url = %client.url(), "generator request failed");
        ApiError::upstream_unavailable("STIX generator is unreachable")
    })?;

    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = upstream
        .content_type
        .as_deref()
        .and_then(|v| HeaderValue::from_str(v).ok())
        .unwrap_or(HeaderValue::from_static("application/json"));

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, content_type);
    Ok((status, headers, upstream.body).into_response())
}
