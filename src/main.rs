use clap::Parser;
use keyword_pulse::app::App;
use keyword_pulse::cli::Args;
use keyword_pulse::config::Config;
use keyword_pulse::logging::setup_logging;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Config must load before logging so startup errors are never dropped.
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        "starting keyword-pulse"
    );

    let app = match App::new(config) {
        Ok(app) => app,
        Err(e) => {
            error!(error = format!("{e:#}"), "failed to initialize application");
            return ExitCode::FAILURE;
        }
    };

    app.run().await
}
