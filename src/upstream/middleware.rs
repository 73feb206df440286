//! HTTP middleware for the upstream clients.

use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Logs every outbound request with its status and duration.
pub struct TransactionLogger;

#[async_trait::async_trait]
impl Middleware for TransactionLogger {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let method = req.method().clone();
        let path = req.url().path().to_string();
        let start = Instant::now();

        trace!(method = %method, path = %path, "upstream request");

        let result = next.run(req, extensions).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => {
                let status = response.status().as_u16();
                if response.status().is_success() {
                    debug!(method = %method, path = %path, status, duration_ms, "upstream response");
                } else {
                    warn!(method = %method, path = %path, status, duration_ms, "upstream error response");
                }
            }
            Err(error) => {
                warn!(method = %method, path = %path, duration_ms, error = %error, "upstream request failed");
            }
        }

        result
    }
}
