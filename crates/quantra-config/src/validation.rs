//! Configuration validation.

use crate::AppConfig;
use quantra_core::{QuantraError, QuantraResult};

/// Validates a loaded configuration, rejecting values the orchestration
/// core cannot run with.
pub fn validate_config(config: &AppConfig) -> QuantraResult<()> {
    if config.jobs.worker_count == 0 {
        return Err(QuantraError::Configuration(
            "jobs.worker_count must be at least 1".to_string(),
        ));
    }

    if config.jobs.max_attempts == 0 {
        return Err(QuantraError::Configuration(
            "jobs.max_attempts must be at least 1".to_string(),
        ));
    }

    if config.jobs.backoff_secs.is_empty() {
        return Err(QuantraError::Configuration(
            "jobs.backoff_secs must contain at least one delay".to_string(),
        ));
    }

    if config.database.max_connections == 0 {
        return Err(QuantraError::Configuration(
            "database.max_connections must be at least 1".to_string(),
        ));
    }

    if config.market_data.cache_ttl_secs == 0 {
        return Err(QuantraError::Configuration(
            "market_data.cache_ttl_secs must be at least 1".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = AppConfig::default();
        config.jobs.worker_count = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_backoff_table_rejected() {
        let mut config = AppConfig::default();
        config.jobs.backoff_secs.clear();
        assert!(validate_config(&config).is_err());
    }
}
