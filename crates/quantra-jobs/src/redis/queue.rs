//! Redis-backed dispatch queue.

use super::RedisKeys;
use crate::error::JobResult;
use crate::metrics::names;
use crate::queue::DispatchQueue;
use async_trait::async_trait;
use deadpool_redis::Pool;
use metrics::counter;
use quantra_core::JobId;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::debug;

/// Dispatch queue over a Redis list: `LPUSH` to append, `BRPOP` to dequeue.
///
/// `BRPOP` is atomic across consumers, so no two workers ever observe the
/// same delivery.
pub struct RedisDispatchQueue {
    pool: Pool,
    keys: RedisKeys,
}

impl RedisDispatchQueue {
    /// Creates a new Redis dispatch queue.
    #[must_use]
    pub fn new(pool: Pool, key_prefix: &str) -> Self {
        Self {
            pool,
            keys: RedisKeys::new(key_prefix),
        }
    }

    /// Get a connection from the pool.
    async fn conn(&self) -> JobResult<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl DispatchQueue for RedisDispatchQueue {
    async fn push(&self, job_id: JobId) -> JobResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .lpush(self.keys.dispatch(), job_id.into_inner())
            .await?;
        counter!(names::JOBS_ENQUEUED_TOTAL).increment(1);
        debug!(job_id = %job_id, "Pushed job to dispatch queue");
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> JobResult<Option<JobId>> {
        let mut conn = self.conn().await?;
        let reply: Option<(String, i64)> = conn
            .brpop(self.keys.dispatch(), timeout.as_secs_f64())
            .await?;
        Ok(reply.map(|(_, id)| JobId::new(id)))
    }

    async fn len(&self) -> JobResult<u64> {
        let mut conn = self.conn().await?;
        let length: u64 = conn.llen(self.keys.dispatch()).await?;
        Ok(length)
    }

    async fn health_check(&self) -> JobResult<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(())
    }
}
