//! # Quantra Config
//!
//! Layered configuration loading for the Quantra backtest service.
//! Values come from `config/default.toml`, an environment-specific TOML
//! overlay, and `QUANTRA_*` environment variables, in that order.

pub mod app_config;
pub mod loader;
pub mod validation;

pub use app_config::{
    AppConfig, AppMetadata, DatabaseConfig, JanitorSettings, JobsSettings, MarketDataSettings,
    RedisConfig, ServerConfig,
};
pub use loader::ConfigLoader;
pub use validation::validate_config;
