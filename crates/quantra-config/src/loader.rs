//! Configuration loader with layered sources.

use crate::{validate_config, AppConfig};
use config::{Config, Environment, File};
use quantra_core::QuantraError;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Configuration loader with runtime refresh support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<AppConfig>>,
    config_dir: String,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `config/default.toml` - Default values
    /// 2. `config/{environment}.toml` - Environment-specific overrides
    /// 3. Environment variables with `QUANTRA_` prefix
    pub fn new(config_dir: impl Into<String>) -> Result<Self, QuantraError> {
        let config_dir = config_dir.into();
        let config = Self::load_config(&config_dir)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
        })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> Result<Self, QuantraError> {
        Self::new("./config")
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Reloads the configuration from disk.
    pub async fn reload(&self) -> Result<(), QuantraError> {
        let new_config = Self::load_config(&self.config_dir)?;
        let mut config = self.config.write().await;
        *config = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Loads configuration from the specified directory.
    fn load_config(config_dir: &str) -> Result<AppConfig, QuantraError> {
        // Load .env file if present
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment =
            std::env::var("QUANTRA_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        info!("Loading configuration for environment: {}", environment);

        let mut builder = Config::builder();

        // 1. Load default configuration
        let default_path = format!("{}/default.toml", config_dir);
        if Path::new(&default_path).exists() {
            debug!("Loading default config from: {}", default_path);
            builder = builder.add_source(File::with_name(&default_path).required(false));
        }

        // 2. Load environment-specific configuration
        let env_path = format!("{}/{}.toml", config_dir, environment);
        if Path::new(&env_path).exists() {
            debug!("Loading environment config from: {}", env_path);
            builder = builder.add_source(File::with_name(&env_path).required(false));
        }

        // 3. Environment variable overrides, e.g. QUANTRA_JOBS__WORKER_COUNT=5
        builder = builder.add_source(
            Environment::with_prefix("QUANTRA")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("jobs.backoff_secs")
                .with_list_parse_key("server.cors_origins"),
        );

        let config: AppConfig = builder
            .build()
            .map_err(|e| QuantraError::Configuration(format!("Failed to build config: {}", e)))?
            .try_deserialize()
            .map_err(|e| {
                QuantraError::Configuration(format!("Failed to deserialize config: {}", e))
            })?;

        validate_config(&config)?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loads_defaults_when_no_files_present() {
        let loader = ConfigLoader::new("/nonexistent-config-dir").unwrap();
        let config = loader.get().await;
        assert_eq!(config.jobs.worker_count, 3);
        assert_eq!(config.app.name, "quantra");
    }
}
