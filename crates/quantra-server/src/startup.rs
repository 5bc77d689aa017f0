//! Server startup utilities.

use quantra_config::ServerConfig;
use tracing::info;

/// Prints the startup banner.
pub fn print_banner() {
    info!(
        r#"
   ____                    __
  / __ \__  ______ _____  / /__________ _
 / / / / / / / __ `/ __ \/ __/ ___/ __ `/
/ /_/ / /_/ / /_/ / / / / /_/ /  / /_/ /
\___\_\__,_/\__,_/_/ /_/\__/_/   \__,_/

              Backtest Orchestrator
    "#
    );
}

/// Prints server startup information.
pub fn print_startup_info(server: &ServerConfig) {
    let separator = "=".repeat(60);
    info!("{}", separator);
    info!("REST API:  http://{}:{}", server.host, server.port);
    info!("Health:    http://{}:{}/health", server.host, server.port);
    info!("API Docs:  http://{}:{}/swagger-ui", server.host, server.port);
    info!("{}", separator);
}
