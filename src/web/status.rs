//! Health and status handlers.

use axum::extract::State;
use axum::response::Json;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::trace;

use crate::config::FetchProfile;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ProfileInfo {
    name: &'static str,
    max_attempts: u32,
    timeout_ms: u64,
    pacing_ms: u64,
    budget_ms: Option<u64>,
}

impl From<&FetchProfile> for ProfileInfo {
    fn from(profile: &FetchProfile) -> Self {
        Self {
            name: profile.name,
            max_attempts: profile.retry.max_attempts,
            timeout_ms: profile.retry.request_timeout.as_millis() as u64,
            pacing_ms: profile.pacing.as_millis() as u64,
            budget_ms: profile.budget.map(|b| b.as_millis() as u64),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RouteStatus {
    mentions: bool,
    stix_bundle: bool,
    stix_generator: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: &'static str,
    version: &'static str,
    commit: &'static str,
    uptime_secs: u64,
    routes: RouteStatus,
    record_type: Option<String>,
    max_bulk_terms: usize,
    profiles: Vec<ProfileInfo>,
}

/// Health check endpoint
pub(super) async fn health() -> Json<Value> {
    trace!("health check requested");
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Version, enabled routes, and the effective fetch profiles.
pub(super) async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let profiles = &state.profiles;

    Json(StatusResponse {
        status: "active",
        version: env!("CARGO_PKG_VERSION"),
        commit: env!("GIT_COMMIT_HASH"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        routes: RouteStatus {
            mentions: true,
            stix_bundle: state.vulns.is_some(),
            stix_generator: state.generator.is_some(),
        },
        record_type: state.scope.record_type.clone(),
        max_bulk_terms: state.max_bulk_terms,
        profiles: [
            &profiles.weekly,
            &profiles.report,
            &profiles.bulk,
            &profiles.vulnerabilities,
        ]
        .into_iter()
        .map(ProfileInfo::from)
        .collect(),
    })
}
