//! Application lifecycle: serve HTTP, run workers, shut down cleanly.

use crate::{di, startup};
use quantra_config::AppConfig;
use quantra_core::{QuantraError, QuantraResult};
use quantra_jobs::register_metrics;
use quantra_rest::{create_router, AppState};
use tokio::sync::broadcast;
use tracing::{error, info};

/// Runs the application until a shutdown signal arrives.
pub async fn run(config: AppConfig) -> QuantraResult<()> {
    register_metrics();

    let ctx = di::build_app_context(&config).await?;
    let state = AppState::new(ctx.submissions.clone(), ctx.coordinator.clone());
    let router = create_router(state, &config.server);

    let (shutdown_tx, _) = broadcast::channel(1);

    // Worker pool
    let worker_handle = if config.jobs.enabled {
        let pool = ctx.worker_pool.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = pool.start().await {
                error!(error = %e, "Worker pool exited with an error");
            }
        }))
    } else {
        info!("Workers disabled; submissions are accepted but will not drain");
        None
    };

    // Janitor
    let janitor_handle = ctx.janitor.clone().map(|janitor| {
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move { janitor.run(shutdown_rx).await })
    });

    // HTTP server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| QuantraError::Configuration(format!("Failed to bind {}: {}", addr, e)))?;
    startup::print_startup_info(&config.server);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| QuantraError::internal(format!("HTTP server error: {}", e)))?;

    info!("HTTP server stopped; shutting down background tasks");
    let _ = shutdown_tx.send(());
    ctx.worker_pool.stop();

    if let Some(handle) = worker_handle {
        let _ = handle.await;
    }
    if let Some(handle) = janitor_handle {
        let _ = handle.await;
    }

    ctx.db_pool.close().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for the shutdown signal");
        return;
    }
    info!("Shutdown signal received");
}
