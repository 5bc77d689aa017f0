//! Dispatch queue abstraction.

use crate::error::JobResult;
use async_trait::async_trait;
use quantra_core::{Interface, JobId};
use std::time::Duration;

/// Shared FIFO of job ids with atomic blocking dequeue.
///
/// Ordering is approximately FIFO; strict ordering is not required because
/// execution is re-disciplined by the executor's lock-and-check protocol.
/// Backend unavailability is a worker-level error, never a job-level one.
#[async_trait]
pub trait DispatchQueue: Interface + Send + Sync {
    /// Appends a job id; durable within the queue backend, never dropped
    /// on success.
    async fn push(&self, job_id: JobId) -> JobResult<()>;

    /// Blocking dequeue returning within `timeout`; `None` on timeout.
    ///
    /// Atomic: no two callers ever observe the same id from a single push.
    async fn pop(&self, timeout: Duration) -> JobResult<Option<JobId>>;

    /// Current queue length.
    async fn len(&self) -> JobResult<u64>;

    /// Returns true when the queue is empty.
    async fn is_empty(&self) -> JobResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Health check against the backend.
    async fn health_check(&self) -> JobResult<()>;
}
