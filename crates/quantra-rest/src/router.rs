//! Main application router.

use crate::{
    controllers::{backtest_controller, health_controller, sweep_controller},
    openapi::ApiDoc,
    state::AppState,
};
use axum::{
    routing::{get, post},
    Json, Router,
};
use quantra_config::ServerConfig;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Creates the main application router.
///
/// The sweep routes are registered as flat siblings of the backtest routes
/// (`/backtests/sweeps` and `/backtests/{id}` coexist; the static segment
/// wins over the parameter).
pub fn create_router(state: AppState, server_config: &ServerConfig) -> Router {
    let cors = create_cors_layer(server_config);

    let api = Router::new()
        .route("/backtests", post(backtest_controller::submit_backtest))
        .route("/backtests/:id", get(backtest_controller::get_backtest))
        .route("/backtests/sweeps", post(sweep_controller::submit_sweep))
        .route("/backtests/sweeps/:id", get(sweep_controller::get_sweep))
        .with_state(state);

    let router = Router::new()
        // Health endpoints
        .merge(health_controller::router())
        // Core API
        .merge(api)
        // Swagger UI and OpenAPI spec
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Root endpoint
        .route("/", get(root))
        // Middleware layers
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    info!("Router created with REST endpoints and Swagger UI at /swagger-ui");
    router
}

/// Creates a CORS layer based on server configuration.
fn create_cors_layer(server_config: &ServerConfig) -> CorsLayer {
    if server_config.cors_enabled {
        if server_config.cors_origins.contains(&"*".to_string()) {
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    }
}

/// Root endpoint with service metadata.
async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "quantra",
        "version": env!("CARGO_PKG_VERSION"),
        "docs": "/swagger-ui"
    }))
}
