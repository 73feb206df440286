//! Single-term mention count routes.

use axum::extract::{Query, State};
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{instrument, warn};

use crate::aggregate::{AggregationDriver, AggregationRun, Term};
use crate::export::export_run;
use crate::state::AppState;
use crate::web::error::{ApiError, ApiErrorCode};
use crate::window::WindowSpec;

#[derive(Debug, Deserialize)]
pub struct WeeklyParams {
    pub term: Option<String>,
    pub site: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReportParams {
    pub term: Option<String>,
    pub window: Option<String>,
    pub site: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WeeklyResponse {
    pub partial: bool,
    pub data: Vec<DayTotal>,
}

#[derive(Debug, Serialize)]
pub struct DayTotal {
    pub day: String,
    pub total: Total,
}

#[derive(Debug, Serialize)]
pub struct Total {
    pub value: u64,
    pub relation: &'static str,
}

impl From<&AggregationRun> for WeeklyResponse {
    fn from(run: &AggregationRun) -> Self {
        Self {
            partial: run.partial,
            data: run
                .results
                .iter()
                .map(|result| DayTotal {
                    day: result.interval.label.clone(),
                    total: Total {
                        value: result.count,
                        relation: "=",
                    },
                })
                .collect(),
        }
    }
}

/// `GET /api/mentions/weekly`
#[instrument(skip_all)]
pub(super) async fn weekly(
    State(state): State<AppState>,
    Query(params): Query<WeeklyParams>,
) -> Result<Json<WeeklyResponse>, ApiError> {
    let term = require_term(params.term.as_deref())?;
    let intervals = WindowSpec::LAST_7_DAYS.intervals(Utc::now());
    let scope = state.scope.clone().with_site(params.site);

    let driver = AggregationDriver::new(state.search.as_ref(), &state.profiles.weekly, &scope);
    let run = driver.run_single(term, &intervals).await;
    ensure_retrieved(&run)?;

    Ok(Json(WeeklyResponse::from(&run)))
}

/// `GET /api/mentions/report`
#[instrument(skip_all)]
pub(super) async fn report(
    State(state): State<AppState>,
    Query(params): Query<ReportParams>,
) -> Result<Response, ApiError> {
    let term = require_term(params.term.as_deref())?;
    let window = parse_window(params.window.as_deref(), WindowSpec::LAST_12_MONTHS)?;
    let intervals = window.intervals(Utc::now());
    let scope = state.scope.clone().with_site(params.site);

    let driver = AggregationDriver::new(state.search.as_ref(), &state.profiles.report, &scope);
    let run = driver.run_single(term, &intervals).await;
    ensure_retrieved(&run)?;

    let body = export_run(&run, &intervals).map_err(|e| {
        warn!(error = ?e, "failed to render report CSV");
        ApiError::internal_error("Failed to render CSV")
    })?;
    let filename = format!("mentions-{}-{}.csv", filename_slug(run.term.as_str()), window.slug());
    Ok(csv_attachment(body, &filename))
}

pub(super) fn require_term(raw: Option<&str>) -> Result<Term, ApiError> {
    raw.and_then(Term::new)
        .ok_or_else(|| ApiError::bad_request("query parameter 'term' is required"))
}

pub(super) fn parse_window(raw: Option<&str>, default: WindowSpec) -> Result<WindowSpec, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e: String| ApiError::new(ApiErrorCode::InvalidWindow, e)),
    }
}

/// A run that stopped on its very first cell has nothing to show.
fn ensure_retrieved(run: &AggregationRun) -> Result<(), ApiError> {
    if run.has_data() {
        return Ok(());
    }
    if let Some(budget) = run.budget_exhausted
        && run.failure.is_none()
    {
        return Err(ApiError::new(
            ApiErrorCode::UpstreamTimeout,
            format!(
                "no mention counts for '{}' were retrieved within {}s",
                run.term,
                budget.as_secs()
            ),
        ));
    }
    let Some(failure) = &run.failure else {
        return Ok(());
    };

    Err(ApiError::upstream_unavailable(format!(
        "could not retrieve mention counts for '{}': {}",
        failure.term, failure.error
    ))
    .with_details(json!({
        "term": failure.term,
        "period": failure.label,
        "kind": failure.error.kind(),
        "status": failure.error.status(),
    })))
}

pub(super) fn csv_attachment(body: String, filename: &str) -> Response {
    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

/// Lowercase ASCII alphanumerics with single dashes between runs.
fn filename_slug(term: &str) -> String {
    let slug = term
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
        .to_ascii_lowercase();
    if slug.is_empty() { "term".to_string() } else { slug }
}
