//! HTTP routes driven through the full router with scripted upstreams.

mod helpers;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use helpers::{HungSearch, ScriptedSearch, ScriptedVulns, SlowSearch, status, total};
use keyword_pulse::aggregate::RetryPolicy;
use keyword_pulse::config::Profiles;
use keyword_pulse::state::AppState;
use keyword_pulse::upstream::RawResponse;
use keyword_pulse::web::create_router;

const BOUNDARY: &str = "keyword-pulse-test-boundary";

fn state_with(search: Arc<ScriptedSearch>) -> AppState {
    AppState::new(search.clone(), search, Profiles::immediate(3))
}

fn router(state: AppState) -> Router {
    create_router(state)
}

async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

fn multipart(parts: &[(&str, Option<&str>, &str)]) -> Body {
    let mut body = String::new();
    for (name, filename, content) in parts {
        body.push_str(&format!("--{BOUNDARY}\r\n"));
        match filename {
            Some(filename) => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: text/csv\r\n\r\n"
            )),
            None => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
            )),
        }
        body.push_str(content);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    Body::from(body)
}

async fn post_bulk(app: Router, body: Body) -> Response {
    let request = Request::post("/api/mentions/bulk")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(body)
        .unwrap();
    app.oneshot(request).await.unwrap()
}

#[tokio::test]
async fn health_carries_ambient_headers() {
    let app = router(state_with(Arc::new(ScriptedSearch::new([]))));
    let response = get(app, "/api/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
    assert_eq!(body_json(response).await["status"], "healthy");
}

#[tokio::test]
async fn inbound_request_id_is_echoed() {
    let app = router(state_with(Arc::new(ScriptedSearch::new([]))));
    let request = Request::get("/api/health")
        .header("x-request-id", "edge-123")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "edge-123");
}

#[tokio::test]
async fn weekly_returns_seven_days() {
    let search = Arc::new(ScriptedSearch::new([]).with_fallback(total(11)));
    let app = router(state_with(search.clone()));

    let response = get(app, "/api/mentions/weekly?term=lockbit").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["partial"], false);
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 7);
    assert_eq!(data[0]["total"], json!({"value": 11, "relation": "="}));
    assert_eq!(search.calls(), 7);
}

#[tokio::test]
async fn weekly_requires_a_term() {
    let search = Arc::new(ScriptedSearch::new([]));
    let app = router(state_with(search.clone()));

    let response = get(app, "/api/mentions/weekly?term=%20%20").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
    assert_eq!(search.calls(), 0);
}

#[tokio::test]
async fn weekly_first_day_failure_is_bad_gateway() {
    let search = Arc::new(ScriptedSearch::new([status(401)]));
    let app = router(state_with(search));

    let response = get(app, "/api/mentions/weekly?term=lockbit").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let json = body_json(response).await;
    assert_eq!(json["code"], "UPSTREAM_UNAVAILABLE");
    assert_eq!(json["details"]["kind"], "client_error");
    assert_eq!(json["details"]["status"], 401);
}

/// Shipped retry curve and timeouts with the weekly pacing and budget.
fn production_weekly() -> Profiles {
    let mut profiles = Profiles::immediate(3);
    profiles.weekly.retry = RetryPolicy::default();
    profiles.weekly.pacing = Duration::from_millis(100);
    profiles.weekly.budget = Some(Duration::from_secs(45));
    profiles
}

#[tokio::test(start_paused = true)]
async fn unanswered_upstream_is_bad_gateway_not_route_timeout() {
    let search = Arc::new(HungSearch::default());
    let app = router(AppState::new(search.clone(), search.clone(), production_weekly()));

    let response = get(app, "/api/mentions/weekly?term=lockbit").await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(search.calls(), 3);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UPSTREAM_UNAVAILABLE");
    assert_eq!(json["details"]["kind"], "timeout");
}

#[tokio::test(start_paused = true)]
async fn slow_upstream_returns_partial_week_within_budget() {
    let search = Arc::new(SlowSearch::new(Duration::from_secs(20)));
    let app = router(AppState::new(search.clone(), search.clone(), production_weekly()));

    let response = get(app, "/api/mentions/weekly?term=lockbit").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["partial"], true);
    assert_eq!(json["data"].as_array().unwrap().len(), 3);
    assert_eq!(search.calls(), 3);
}

#[tokio::test]
async fn budget_spent_before_any_count_is_gateway_timeout() {
    let search = Arc::new(ScriptedSearch::new([]));
    let mut profiles = Profiles::immediate(3);
    profiles.weekly.budget = Some(Duration::ZERO);
    let app = router(AppState::new(search.clone(), search.clone(), profiles));

    let response = get(app, "/api/mentions/weekly?term=lockbit").await;

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(search.calls(), 0);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UPSTREAM_TIMEOUT");
}

#[tokio::test]
async fn weekly_later_failure_is_partial() {
    let search = Arc::new(ScriptedSearch::new([total(4), total(5), status(404)]));
    let app = router(state_with(search));

    let response = get(app, "/api/mentions/weekly?term=lockbit").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["partial"], true);
    assert_eq!(json["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn report_is_a_csv_attachment() {
    let search = Arc::new(ScriptedSearch::new([]).with_fallback(total(2)));
    let app = router(state_with(search.clone()));

    let response = get(app, "/api/mentions/report?term=Cobalt%20Strike").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"mentions-cobalt-strike-12m.csv\""
    );

    let csv = body_text(response).await;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].split(',').count(), 13);
    assert!(lines[1].starts_with("Cobalt Strike,2,"));
    assert_eq!(search.calls(), 12);
}

#[tokio::test]
async fn report_rejects_unknown_window() {
    let app = router(state_with(Arc::new(ScriptedSearch::new([]))));
    let response = get(app, "/api/mentions/report?term=x&window=3w").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "INVALID_WINDOW");
}

#[tokio::test]
async fn bulk_upload_returns_one_row_per_term() {
    let search = Arc::new(ScriptedSearch::new([]).with_fallback(total(3)));
    let app = router(state_with(search.clone()));

    let body = multipart(&[
        ("file", Some("terms.csv"), "keyword\nalpha\n\nbeta\n"),
        ("window", None, "7d"),
    ]);
    let response = post_bulk(app, body).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"bulk-mentions-7d.csv\""
    );

    let csv = body_text(response).await;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1], "alpha,3,3,3,3,3,3,3");
    assert_eq!(lines[2], "beta,3,3,3,3,3,3,3");
    assert_eq!(search.calls(), 14);
}

#[tokio::test]
async fn bulk_without_file_is_rejected() {
    let app = router(state_with(Arc::new(ScriptedSearch::new([]))));
    let response = post_bulk(app, multipart(&[("window", None, "7d")])).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "INVALID_UPLOAD");
}

#[tokio::test]
async fn bulk_enforces_term_limit() {
    let search = Arc::new(ScriptedSearch::new([]));
    let app = router(state_with(search.clone()).with_max_bulk_terms(2));

    let body = multipart(&[("file", Some("terms.csv"), "a\nb\nc\n")]);
    let response = post_bulk(app, body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "INVALID_UPLOAD");
    assert_eq!(search.calls(), 0);
}

#[tokio::test]
async fn stix_routes_need_configuration() {
    let state = state_with(Arc::new(ScriptedSearch::new([])));

    let response = get(router(state.clone()), "/api/stix/bundle").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "NOT_CONFIGURED");

    let response = get(router(state), "/api/stix/generator").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn stix_bundle_from_listing() {
    let vulns = ScriptedVulns::new([RawResponse::new(
        200,
        json!({
            "total_hits": 1,
            "results": [{
                "id": 77,
                "title": "Gateway auth bypass",
                "products": [{"name": "gateway", "vendor": "Acme"}],
            }],
        })
        .to_string(),
    )]);
    let state = state_with(Arc::new(ScriptedSearch::new([]))).with_vulns(Arc::new(vulns), 50);

    let response = get(router(state), "/api/stix/bundle").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-stix-truncated").is_none());

    let bundle = body_json(response).await;
    assert_eq!(bundle["type"], "bundle");
    let kinds: Vec<&str> = bundle["objects"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["type"].as_str().unwrap())
        .collect();
    assert_eq!(
        kinds,
        ["vulnerability", "software", "relationship", "marking-definition"]
    );
}

#[tokio::test]
async fn stix_bundle_upstream_failure_is_bad_gateway() {
    let vulns = ScriptedVulns::new([RawResponse::new(403, "forbidden")]);
    let state = state_with(Arc::new(ScriptedSearch::new([]))).with_vulns(Arc::new(vulns), 50);

    let response = get(router(state), "/api/stix/bundle").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn status_reports_enabled_routes() {
    let app = router(state_with(Arc::new(ScriptedSearch::new([]))));
    let json = body_json(get(app, "/api/status").await).await;

    assert_eq!(json["routes"]["mentions"], true);
    assert_eq!(json["routes"]["stix_bundle"], false);
    assert_eq!(json["profiles"].as_array().unwrap().len(), 4);
    assert_eq!(json["profiles"][2]["name"], "bulk");
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let app = router(state_with(Arc::new(ScriptedSearch::new([]))));
    let response = get(app, "/api/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}
