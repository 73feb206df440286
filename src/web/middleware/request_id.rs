//! Per-request tracing spans with request IDs.
//!
//! An inbound `X-Request-Id` from a fronting proxy is reused when it looks
//! sane; otherwise a ULID is generated. The resolved ID is echoed back in the
//! `X-Request-Id` response header, and each response is logged at a level
//! proportional to its status.

use axum::extract::Request;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::Response;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::Instrument;

static REQUEST_ID: &str = "x-request-id";

/// Longest inbound ID accepted; anything longer is replaced.
const MAX_INBOUND_ID_LEN: usize = 64;

fn inbound_id(req: &Request) -> Option<String> {
    req.headers()
        .get(REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_INBOUND_ID_LEN)
        .filter(|id| id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .map(String::from)
}

#[derive(Clone)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

#[derive(Clone)]
pub struct RequestIdService<S> {
    inner: S,
}

impl<S, B> Service<Request> for RequestIdService<S>
where
    S: Service<Request, Response = Response<B>> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::fmt::Debug,
    B: Send + 'static,
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
        let req_id = inbound_id(&req).unwrap_or_else(|| ulid::Ulid::new().to_string());
        let header_value = HeaderValue::from_str(&req_id).ok();
        let span = tracing::info_span!("request", req_id = %req_id);

        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let start = Instant::now();
        let future = span.in_scope(|| self.inner.call(req));

        Box::pin(
            async move {
                let mut result = future.await;
                let duration_ms = start.elapsed().as_millis() as u64;

                match &mut result {
                    Ok(response) => {
                        log_response(&method, &path, response.status(), duration_ms);
                        if let Some(value) = header_value {
                            response.headers_mut().insert(REQUEST_ID, value);
                        }
                    }
                    Err(e) => {
                        tracing::error!(method = %method, path = %path, error = ?e, duration_ms, "request failed");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}

/// Client errors at info, server errors at warn, everything else at debug.
fn log_response(method: &Method, path: &str, status: StatusCode, duration_ms: u64) {
    let status = status.as_u16();
    match status {
        400..=499 => tracing::info!(%method, path, status, duration_ms, "client error response"),
        500.. => tracing::warn!(%method, path, status, duration_ms, "server error response"),
        _ => tracing::debug!(%method, path, status, duration_ms, "response"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with(id: &str) -> Request {
        Request::builder()
            .header(REQUEST_ID, id)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn inbound_ids_are_validated() {
        assert_eq!(inbound_id(&request_with("edge-42_a")).as_deref(), Some("edge-42_a"));
        assert_eq!(inbound_id(&request_with("has space")), None);
        assert_eq!(inbound_id(&request_with(&"x".repeat(65))), None);
    }
}
