//! # Quantra Server
//!
//! Main entry point: loads configuration, wires the stores, queue, worker
//! pool, and services together, and serves the HTTP surface until a
//! shutdown signal arrives.

use quantra_config::ConfigLoader;
use quantra_core::QuantraResult;
use tracing::{error, info};

mod app;
mod di;
mod startup;

#[tokio::main]
async fn main() {
    init_logging();

    startup::print_banner();
    info!("Starting Quantra server...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run().await {
        error!("Application error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> QuantraResult<()> {
    let config_loader = ConfigLoader::from_default_location()?;
    let config = config_loader.get().await;

    info!("Environment: {}", config.app.environment);
    info!(
        "Workers: {} (enabled: {})",
        config.jobs.worker_count, config.jobs.enabled
    );

    app::run(config).await
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
