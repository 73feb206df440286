//! Uploaded keyword list route.

use axum::extract::{Multipart, State};
use axum::response::Response;
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::aggregate::AggregationDriver;
use crate::export::export_bulk;
use crate::state::AppState;
use crate::upload::parse_terms;
use crate::web::error::{ApiError, ApiErrorCode};
use crate::web::mentions::{csv_attachment, parse_window};
use crate::web::middleware::client_ip::ClientIp;
use crate::window::WindowSpec;

/// Uploads larger than this are rejected before parsing.
pub const UPLOAD_LIMIT_BYTES: usize = 1024 * 1024;

/// `POST /api/mentions/bulk`
///
/// Multipart fields: `file` (required), `window` (defaults to 7 days), `site`.
#[instrument(skip_all)]
pub(super) async fn bulk(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut file = None;
    let mut window = None;
    let mut site = None;

    while let Some(field) = multipart.next_field().await.map_err(invalid_upload)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => file = Some(field.bytes().await.map_err(invalid_upload)?),
            Some("window") => window = Some(field.text().await.map_err(invalid_upload)?),
            Some("site") => site = Some(field.text().await.map_err(invalid_upload)?),
            _ => {}
        }
    }

    let file = file.ok_or_else(|| {
        ApiError::new(ApiErrorCode::InvalidUpload, "multipart field 'file' is required")
    })?;
    let window = parse_window(window.as_deref(), WindowSpec::LAST_7_DAYS)?;
    let terms = parse_terms(&file, state.max_bulk_terms)
        .map_err(|e| ApiError::new(ApiErrorCode::InvalidUpload, e.to_string()))?;

    info!(
        client_ip = ?client_ip,
        terms = terms.len(),
        window = %window,
        "bulk upload accepted"
    );

    let intervals = window.intervals(Utc::now());
    let scope = state.scope.clone().with_site(site);
    let driver = AggregationDriver::new(state.bulk.as_ref(), &state.profiles.bulk, &scope);
    let run = driver.run_bulk(terms, intervals).await;

    let body = export_bulk(&run).map_err(|e| {
        warn!(error = ?e, "failed to render bulk CSV");
        ApiError::internal_error("Failed to render CSV")
    })?;
    Ok(csv_attachment(body, &format!("bulk-mentions-{}.csv", window.slug())))
}

fn invalid_upload(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::new(
        ApiErrorCode::InvalidUpload,
        format!("malformed multipart body: {}", e.body_text()),
    )
}
