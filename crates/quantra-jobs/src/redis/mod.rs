//! Redis dispatch queue backend.

pub mod queue;

pub use queue::RedisDispatchQueue;

use crate::error::{JobError, JobResult};
use quantra_config::RedisConfig;

/// Key layout for queue-related Redis keys.
#[derive(Debug, Clone)]
pub struct RedisKeys {
    prefix: String,
}

impl RedisKeys {
    /// Creates a key layout under the given prefix.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    /// The dispatch list key.
    #[must_use]
    pub fn dispatch(&self) -> String {
        format!("{}:dispatch", self.prefix)
    }
}

/// Creates a deadpool Redis pool from configuration.
pub fn create_redis_pool(config: &RedisConfig) -> JobResult<deadpool_redis::Pool> {
    let cfg = deadpool_redis::Config::from_url(&config.url);
    let pool = cfg
        .builder()
        .map_err(|e| JobError::Configuration(format!("Invalid Redis config: {}", e)))?
        .max_size(config.pool_size)
        .runtime(deadpool_redis::Runtime::Tokio1)
        .build()
        .map_err(|e| JobError::Configuration(format!("Failed to create Redis pool: {}", e)))?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let keys = RedisKeys::new("quantra:jobs");
        assert_eq!(keys.dispatch(), "quantra:jobs:dispatch");
    }
}
