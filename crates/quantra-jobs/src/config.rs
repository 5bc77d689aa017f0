//! Worker pool runtime configuration.

use quantra_config::JobsSettings;
use std::time::Duration;

/// Runtime configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of long-running consumer tasks.
    pub worker_count: usize,

    /// Per-iteration blocking duration for queue pop.
    pub poll_timeout: Duration,

    /// Delay before a worker resumes after a backend error.
    pub recovery_delay: Duration,

    /// Grace period for in-flight jobs on shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 3,
            poll_timeout: Duration::from_secs(1),
            recovery_delay: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&JobsSettings> for WorkerPoolConfig {
    fn from(settings: &JobsSettings) -> Self {
        Self {
            worker_count: settings.worker_count,
            poll_timeout: settings.poll_timeout(),
            recovery_delay: settings.recovery_delay(),
            shutdown_timeout: settings.shutdown_timeout(),
        }
    }
}
