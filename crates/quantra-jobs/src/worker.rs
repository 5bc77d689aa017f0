//! Worker pool: long-running consumers of the dispatch queue.

use crate::config::WorkerPoolConfig;
use crate::error::{JobError, JobResult};
use crate::executor::JobExecutor;
use crate::metrics::names;
use crate::queue::DispatchQueue;
use crate::retry::RetryPolicy;
use metrics::{counter, gauge};
use quantra_core::JobId;
use quantra_store::JobStore;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
#[cfg(test)]
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Fixed-size pool of consumer tasks, one per configured worker slot.
///
/// Each worker pops from the dispatch queue, applies the backoff sleep in a
/// lock-free preamble, and hands the job id to the executor. The preamble's
/// unlocked read only informs the sleep; a stale read there shortens or
/// lengthens a wait, never compromises correctness; the authoritative
/// state check happens inside the executor under the row lock.
pub struct WorkerPool {
    id: String,
    queue: Arc<dyn DispatchQueue>,
    store: Arc<dyn JobStore>,
    executor: Arc<JobExecutor>,
    retry: RetryPolicy,
    config: WorkerPoolConfig,
    shutdown_tx: broadcast::Sender<()>,
    running: Arc<AtomicBool>,
    jobs_processed: Arc<AtomicU64>,
    jobs_failed: Arc<AtomicU64>,
}

impl WorkerPool {
    /// Creates a new worker pool.
    #[must_use]
    pub fn new(
        queue: Arc<dyn DispatchQueue>,
        store: Arc<dyn JobStore>,
        executor: Arc<JobExecutor>,
        retry: RetryPolicy,
        config: WorkerPoolConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            id: format!("worker-pool-{}", Uuid::new_v4()),
            queue,
            store,
            executor,
            retry,
            config,
            shutdown_tx,
            running: Arc::new(AtomicBool::new(false)),
            jobs_processed: Arc::new(AtomicU64::new(0)),
            jobs_failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Starts the workers and runs until [`stop`](Self::stop) is called.
    ///
    /// On shutdown, workers finish any in-flight execution; after the grace
    /// period the remaining tasks are aborted.
    pub async fn start(&self) -> JobResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(JobError::Worker("Worker pool already running".to_string()));
        }

        info!(
            pool_id = %self.id,
            worker_count = self.config.worker_count,
            "Starting worker pool"
        );
        gauge!(names::WORKERS_ACTIVE).set(self.config.worker_count as f64);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut handles = Vec::with_capacity(self.config.worker_count);
        for slot in 0..self.config.worker_count {
            let worker_id = format!("{}-{}", self.id, slot);
            let context = WorkerContext {
                worker_id: worker_id.clone(),
                queue: self.queue.clone(),
                store: self.store.clone(),
                executor: self.executor.clone(),
                retry: self.retry.clone(),
                config: self.config.clone(),
                shutdown_rx: self.shutdown_tx.subscribe(),
                jobs_processed: self.jobs_processed.clone(),
                jobs_failed: self.jobs_failed.clone(),
            };
            handles.push(tokio::spawn(
                worker_loop(context).instrument(tracing::info_span!("worker", id = %worker_id)),
            ));
        }

        // Block until a shutdown signal arrives.
        let _ = shutdown_rx.recv().await;

        info!(pool_id = %self.id, "Waiting for workers to finish...");
        let abort_handles: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        if timeout(self.config.shutdown_timeout, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!(pool_id = %self.id, "Shutdown grace period elapsed; aborting workers");
            for handle in abort_handles {
                handle.abort();
            }
        }

        self.running.store(false, Ordering::SeqCst);
        gauge!(names::WORKERS_ACTIVE).set(0.0);

        info!(
            pool_id = %self.id,
            processed = self.jobs_processed.load(Ordering::Relaxed),
            failed = self.jobs_failed.load(Ordering::Relaxed),
            "Worker pool stopped"
        );

        Ok(())
    }

    /// Signals all workers to stop after their current iteration.
    pub fn stop(&self) {
        info!(pool_id = %self.id, "Stopping worker pool...");
        let _ = self.shutdown_tx.send(());
    }

    /// Check if the pool is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the number of jobs processed.
    pub fn jobs_processed(&self) -> u64 {
        self.jobs_processed.load(Ordering::Relaxed)
    }

    /// Get the number of worker-level failures.
    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    /// Get the pool ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get pool statistics.
    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            id: self.id.clone(),
            running: self.is_running(),
            worker_count: self.config.worker_count,
            jobs_processed: self.jobs_processed(),
            jobs_failed: self.jobs_failed(),
        }
    }
}

/// Worker pool statistics.
#[derive(Debug, Clone)]
pub struct WorkerPoolStats {
    pub id: String,
    pub running: bool,
    pub worker_count: usize,
    pub jobs_processed: u64,
    pub jobs_failed: u64,
}

struct WorkerContext {
    worker_id: String,
    queue: Arc<dyn DispatchQueue>,
    store: Arc<dyn JobStore>,
    executor: Arc<JobExecutor>,
    retry: RetryPolicy,
    config: WorkerPoolConfig,
    shutdown_rx: broadcast::Receiver<()>,
    jobs_processed: Arc<AtomicU64>,
    jobs_failed: Arc<AtomicU64>,
}

async fn worker_loop(mut ctx: WorkerContext) {
    info!(worker_id = %ctx.worker_id, "Worker started");

    loop {
        let job_id = tokio::select! {
            _ = ctx.shutdown_rx.recv() => break,
            popped = ctx.queue.pop(ctx.config.poll_timeout) => match popped {
                Ok(Some(job_id)) => job_id,
                Ok(None) => continue,
                Err(e) => {
                    error!(worker_id = %ctx.worker_id, error = %e, "Queue pop failed");
                    tokio::time::sleep(ctx.config.recovery_delay).await;
                    continue;
                }
            },
        };

        counter!(names::JOBS_DEQUEUED_TOTAL).increment(1);
        debug!(worker_id = %ctx.worker_id, job_id = %job_id, "Dequeued job");

        if !backoff_preamble(&mut ctx, job_id).await {
            continue;
        }

        match ctx.executor.execute(job_id).await {
            Ok(()) => {
                ctx.jobs_processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                ctx.jobs_failed.fetch_add(1, Ordering::Relaxed);
                error!(worker_id = %ctx.worker_id, job_id = %job_id, error = %e, "Execution hit a backend error");
                tokio::time::sleep(ctx.config.recovery_delay).await;
            }
        }
    }

    info!(worker_id = %ctx.worker_id, "Worker stopped");
}

/// Lock-free preamble: sleeps the backoff delay for retried jobs.
///
/// Returns false when the delivery should be dropped (the row vanished).
async fn backoff_preamble(ctx: &mut WorkerContext, job_id: JobId) -> bool {
    match ctx.store.find_job(job_id).await {
        Ok(Some(job)) => {
            if job.attempts > 0 {
                let delay = ctx.retry.delay_for_attempt(job.attempts);
                debug!(
                    worker_id = %ctx.worker_id,
                    job_id = %job_id,
                    attempts = job.attempts,
                    delay_secs = delay.as_secs(),
                    "Backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }
            true
        }
        Ok(None) => {
            warn!(worker_id = %ctx.worker_id, job_id = %job_id, "Job row vanished; dropping delivery");
            false
        }
        Err(e) => {
            error!(worker_id = %ctx.worker_id, job_id = %job_id, error = %e, "Preamble read failed");
            tokio::time::sleep(ctx.config.recovery_delay).await;
            // The executor re-reads under lock; proceed anyway.
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::NullSweepNotifier;
    use crate::testing::{seed_job, InMemoryDispatchQueue, InMemoryJobStore, StubMarketData};
    use chrono::NaiveDate;
    use quantra_core::{JobSpec, JobState};
    use quantra_engine::StrategyRegistry;

    fn spec(symbol: &str) -> JobSpec {
        JobSpec {
            strategy: "BuyAndHold".to_string(),
            symbol: symbol.to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            parameters: serde_json::json!({}),
            initial_capital: 10_000.0,
        }
    }

    fn pool(
        store: Arc<InMemoryJobStore>,
        queue: Arc<InMemoryDispatchQueue>,
        worker_count: usize,
    ) -> WorkerPool {
        let executor = Arc::new(JobExecutor::new(
            store.clone(),
            queue.clone(),
            Arc::new(StubMarketData::new(true)),
            Arc::new(StrategyRegistry::standard()),
            RetryPolicy::default(),
            Arc::new(NullSweepNotifier),
        ));
        let config = WorkerPoolConfig {
            worker_count,
            poll_timeout: Duration::from_millis(10),
            recovery_delay: Duration::from_millis(10),
            shutdown_timeout: Duration::from_secs(5),
        };
        WorkerPool::new(queue, store, executor, RetryPolicy::default(), config)
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(
                std::time::Instant::now() < deadline,
                "condition not reached in time"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_drains_queue_to_completion() {
        let store = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(InMemoryDispatchQueue::new());

        let mut ids = Vec::new();
        for i in 0..5 {
            let id = store.insert(seed_job(spec(&format!("SYM{}", i)), JobState::Queued, None));
            queue.push(id).await.unwrap();
            ids.push(id);
        }

        let pool = Arc::new(pool(store.clone(), queue, 2));
        let runner = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.start().await })
        };

        {
            let store = store.clone();
            let ids = ids.clone();
            wait_for(move || {
                ids.iter()
                    .all(|id| store.get(*id).state == JobState::Completed)
            })
            .await;
        }

        pool.stop();
        runner.await.unwrap().unwrap();

        for id in ids {
            assert_eq!(store.result_count(id), 1);
        }
        assert_eq!(pool.jobs_processed(), 5);
        assert!(!pool.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_duplicate_delivery_to_two_workers_completes_once() {
        let store = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(InMemoryDispatchQueue::new());

        let id = store.insert(seed_job(spec("AAPL"), JobState::Queued, None));
        // The same id delivered twice (simulated duplicate dispatch).
        queue.push(id).await.unwrap();
        queue.push(id).await.unwrap();

        let pool = Arc::new(pool(store.clone(), queue, 2));
        let runner = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.start().await })
        };

        {
            let store = store.clone();
            wait_for(move || store.get(id).state == JobState::Completed).await;
        }
        // Give the losing delivery time to drain as a no-op.
        tokio::time::sleep(Duration::from_millis(100)).await;

        pool.stop();
        runner.await.unwrap().unwrap();

        assert_eq!(store.result_count(id), 1);
    }

    #[tokio::test]
    async fn test_stop_before_start_is_harmless() {
        let store = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(InMemoryDispatchQueue::new());
        let pool = pool(store, queue, 1);
        pool.stop();
        assert!(!pool.is_running());
    }
}
