//! # Quantra REST
//!
//! The HTTP surface of the backtest orchestration service: controllers,
//! the response envelope, validated JSON extraction, and OpenAPI docs.

pub mod controllers;
pub mod extractors;
pub mod openapi;
pub mod responses;
pub mod router;
pub mod state;

pub use responses::{ApiResponse, ApiResult, AppError};
pub use router::create_router;
pub use state::AppState;
