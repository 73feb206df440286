use crate::config::{Config, Profiles, TokenDomain};
use crate::state::AppState;
use crate::stix::{GENERATOR_TIMEOUT, GeneratorClient, VulnClient};
use crate::upstream::{QueryScope, SearchClient};
use crate::utils::fmt_duration;
use crate::web::create_router_with_limits;
use crate::web::middleware::rate_limit::{RateLimitState, prune_periodically};
use anyhow::Context;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Main application struct containing all necessary components
pub struct App {
    config: Config,
    app_state: AppState,
}

impl App {
    /// Build clients and state from configuration. Missing search credentials
    /// are fatal; the vulnerability and generator routes are optional.
    pub fn new(config: Config) -> Result<Self, anyhow::Error> {
        let profiles = Profiles::from_config(&config);
        let search_url = config.search_url()?;

        let search = SearchClient::new(
            search_url.clone(),
            config.resolve_token(TokenDomain::Search)?.to_string(),
            profiles.weekly.retry.request_timeout,
        )
        .context("Failed to create search client")?;
        let bulk = SearchClient::new(
            search_url,
            config.resolve_token(TokenDomain::Bulk)?.to_string(),
            profiles.bulk.retry.request_timeout,
        )
        .context("Failed to create bulk search client")?;

        let scope = QueryScope {
            record_type: config
                .search_record_type
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            site: None,
        };

        let vuln_timeout = profiles.vulnerabilities.retry.request_timeout;
        let mut app_state = AppState::new(Arc::new(search), Arc::new(bulk), profiles)
            .with_scope(scope)
            .with_max_bulk_terms(config.max_bulk_terms);

        match (config.vuln_url(), config.resolve_token(TokenDomain::Vulnerabilities)) {
            (Some(url), Ok(token)) => {
                let client = VulnClient::new(&url?, token.to_string(), vuln_timeout)
                    .context("Failed to create vulnerability client")?;
                app_state = app_state.with_vulns(Arc::new(client), config.vuln_page_size);
            }
            (Some(_), Err(e)) => warn!(error = %e, "vulnerability bundle route disabled"),
            (None, _) => info!("VULN_API_URL not set, vulnerability bundle route disabled"),
        }

        if let Some(url) = config.generator_url() {
            let client = GeneratorClient::new(&url?, GENERATOR_TIMEOUT)
                .context("Failed to create generator client")?;
            app_state = app_state.with_generator(client);
        }

        info!(
            record_type = app_state.scope.record_type.as_deref(),
            vulnerabilities = app_state.vulns.is_some(),
            generator = app_state.generator.is_some(),
            max_attempts = app_state.profiles.weekly.retry.max_attempts,
            bulk_budget = app_state.profiles.bulk.budget.map(fmt_duration),
            "application state ready"
        );

        Ok(App { config, app_state })
    }

    /// Serve until a shutdown signal arrives, then drain within the
    /// configured shutdown timeout.
    pub async fn run(self) -> ExitCode {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, %addr, "failed to bind listener");
                return ExitCode::FAILURE;
            }
        };
        info!(%addr, "web server listening");

        let shutdown = CancellationToken::new();
        let limits = Arc::new(RateLimitState::new());
        tokio::spawn(prune_periodically(limits.clone(), shutdown.child_token()));

        let router = create_router_with_limits(self.app_state, limits);
        let server = tokio::spawn(
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .into_future(),
        );

        wait_for_signal().await;
        shutdown.cancel();
        info!(
            timeout = fmt_duration(self.config.shutdown_timeout),
            "shutting down, draining in-flight requests"
        );

        match tokio::time::timeout(self.config.shutdown_timeout, server).await {
            Ok(Ok(Ok(()))) => {
                info!("web server stopped");
                ExitCode::SUCCESS
            }
            Ok(Ok(Err(e))) => {
                error!(error = %e, "web server failed");
                ExitCode::FAILURE
            }
            Ok(Err(e)) => {
                error!(error = %e, "web server task panicked");
                ExitCode::FAILURE
            }
            Err(_) => {
                warn!("graceful shutdown timed out, exiting with requests in flight");
                ExitCode::FAILURE
            }
        }
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("received Ctrl+C");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("received SIGTERM");
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
