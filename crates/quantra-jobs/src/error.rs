//! Job orchestration error types.

use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Worker-level errors in the orchestration core.
///
/// Job-level failures (a backtest run going wrong) never surface here; they
/// are absorbed by the executor's failure handler and recorded on the job
/// row. These variants cover the backends the workers themselves depend on.
#[derive(Debug, Error)]
pub enum JobError {
    /// Dispatch queue backend failure.
    #[error("Queue error: {0}")]
    Queue(String),

    /// Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Redis pool error.
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Job store failure.
    #[error("Store error: {0}")]
    Store(String),

    /// Worker lifecycle error.
    #[error("Worker error: {0}")]
    Worker(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<quantra_core::QuantraError> for JobError {
    fn from(err: quantra_core::QuantraError) -> Self {
        JobError::Store(err.to_string())
    }
}
