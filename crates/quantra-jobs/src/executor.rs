//! The executor: locks a job, runs the backtest kernel, records the outcome.
//!
//! Three short transactions per execution, so that no row lock is ever held
//! across a gateway call:
//!
//! 1. Claim: lock the row, check the state, mark RUNNING, commit.
//! 2. Kernel: load the series, instantiate the strategy, run the backtest.
//!    No lock held.
//! 3. Terminate: either the completion transaction (result row + COMPLETED
//!    under the optimistic token) or the failure handler in its own
//!    independent transaction.
//!
//! A worker crash after the claim leaves the row RUNNING; the janitor owns
//! recovery of those.

use crate::error::JobResult;
use crate::market_data::MarketDataProvider;
use crate::metrics::names;
use crate::queue::DispatchQueue;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use metrics::{counter, histogram};
use quantra_core::{
    Interface, Job, JobId, JobState, NewBacktestResult, QuantraResult, SweepId,
};
use quantra_engine::{run_backtest, BacktestConfig, BacktestOutcome, StrategyRegistry};
use quantra_store::JobStore;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Callback into the sweep coordinator when a child reaches a terminal
/// state.
#[async_trait]
pub trait SweepNotifier: Interface + Send + Sync {
    /// Invoked after a child of the sweep committed COMPLETED or FAILED.
    async fn on_child_terminal(&self, sweep_id: SweepId) -> QuantraResult<()>;
}

/// A no-op notifier for deployments without sweeps.
pub struct NullSweepNotifier;

#[async_trait]
impl SweepNotifier for NullSweepNotifier {
    async fn on_child_terminal(&self, _sweep_id: SweepId) -> QuantraResult<()> {
        Ok(())
    }
}

/// Locks, runs, and terminates a single job per invocation.
pub struct JobExecutor {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn DispatchQueue>,
    market_data: Arc<dyn MarketDataProvider>,
    registry: Arc<StrategyRegistry>,
    retry: RetryPolicy,
    notifier: Arc<dyn SweepNotifier>,
}

impl JobExecutor {
    /// Creates a new executor.
    #[must_use]
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn DispatchQueue>,
        market_data: Arc<dyn MarketDataProvider>,
        registry: Arc<StrategyRegistry>,
        retry: RetryPolicy,
        notifier: Arc<dyn SweepNotifier>,
    ) -> Self {
        Self {
            store,
            queue,
            market_data,
            registry,
            retry,
            notifier,
        }
    }

    /// Executes the job behind a possibly-stale delivery.
    ///
    /// Job-level failures are absorbed into the retry policy; only backend
    /// faults the worker itself must recover from are returned as errors.
    pub async fn execute(&self, job_id: JobId) -> JobResult<()> {
        let Some(job) = self.claim(job_id).await? else {
            return Ok(());
        };

        let started = Instant::now();
        let outcome = self.run_kernel(&job).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(run) => {
                self.complete(job, run, elapsed.as_millis() as i64).await?;
                histogram!(names::JOB_DURATION_SECONDS).record(elapsed.as_secs_f64());
            }
            Err(reason) => self.handle_failure(job_id, &reason).await?,
        }
        Ok(())
    }

    /// Claim transaction: lock the row, check the state, mark RUNNING.
    ///
    /// Returns the claimed job, or `None` when the delivery should be
    /// dropped without side effects.
    async fn claim(&self, job_id: JobId) -> JobResult<Option<Job>> {
        let mut tx = self.store.begin().await?;

        let Some(mut job) = tx.lock_for_update(job_id).await? else {
            warn!(job_id = %job_id, "Delivered job id has no row; dropping");
            tx.rollback().await?;
            return Ok(None);
        };

        match job.state {
            JobState::Completed => {
                debug!(job_id = %job_id, "Duplicate dispatch of a completed job; dropping");
                tx.rollback().await?;
                Ok(None)
            }
            JobState::Running => {
                // Either a live worker owns it or a crashed one left it
                // behind; the janitor handles the latter.
                debug!(job_id = %job_id, "Job already RUNNING; declining");
                tx.rollback().await?;
                Ok(None)
            }
            JobState::Submitted | JobState::Queued | JobState::Failed => {
                job.transition(JobState::Running);
                match tx.save(&mut job).await {
                    Ok(()) => {
                        tx.commit().await?;
                        debug!(job_id = %job_id, attempts = job.attempts, "Claimed job");
                        Ok(Some(job))
                    }
                    Err(e) if e.is_stale_version() => {
                        debug!(job_id = %job_id, "Claim lost to a concurrent writer; dropping");
                        tx.rollback().await?;
                        Ok(None)
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Runs the computation kernel with no lock held. Any error becomes a
    /// failure reason for the retry policy.
    async fn run_kernel(&self, job: &Job) -> Result<BacktestOutcome, String> {
        let spec = &job.spec;

        let series = self
            .market_data
            .load(&spec.symbol, spec.start_date, spec.end_date)
            .await
            .map_err(|e| format!("market data load failed: {}", e))?;

        if series.is_empty() {
            return Err(format!(
                "missing market data for {} [{} .. {}]",
                spec.symbol, spec.start_date, spec.end_date
            ));
        }

        let mut strategy = self
            .registry
            .create(&spec.strategy, &spec.parameters)
            .map_err(|e| format!("strategy instantiation failed: {}", e))?;

        let config = BacktestConfig {
            series: &series,
            initial_capital: spec.initial_capital,
        };
        run_backtest(strategy.as_mut(), &config).map_err(|e| format!("backtest failed: {}", e))
    }

    /// Completion transaction: result row plus the COMPLETED transition,
    /// guarded by the optimistic token carried from the claim.
    async fn complete(
        &self,
        mut job: Job,
        outcome: BacktestOutcome,
        execution_time_ms: i64,
    ) -> JobResult<()> {
        let metrics = &outcome.metrics;
        let result = NewBacktestResult {
            job_id: job.id,
            total_return: metrics.total_return,
            cagr: metrics.cagr,
            volatility: metrics.volatility,
            sharpe_ratio: metrics.sharpe_ratio,
            sortino_ratio: metrics.sortino_ratio,
            max_drawdown: metrics.max_drawdown,
            win_rate: metrics.win_rate,
            execution_time_ms,
            trade_log: serde_json::to_value(&outcome.trade_log)?,
        };

        let mut tx = self.store.begin().await?;
        tx.write_result(&result).await?;

        job.transition(JobState::Completed);
        match tx.save(&mut job).await {
            Ok(()) => {
                tx.commit().await?;
                counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
                info!(
                    job_id = %job.id,
                    total_return = metrics.total_return,
                    sharpe = metrics.sharpe_ratio,
                    execution_time_ms,
                    "Job completed"
                );
                if let Some(sweep_id) = job.sweep_id {
                    self.notify_sweep(sweep_id).await;
                }
                Ok(())
            }
            Err(e) if e.is_stale_version() => {
                // Another path mutated the row mid-run; it owns the outcome.
                debug!(job_id = %job.id, "Completion lost to a concurrent writer; discarding result");
                tx.rollback().await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Failure handler, in its own independent transaction so the failed
    /// attempt is recorded even though the execution path went wrong.
    async fn handle_failure(&self, job_id: JobId, reason: &str) -> JobResult<()> {
        let mut tx = self.store.begin().await?;

        let Some(mut job) = tx.lock_for_update(job_id).await? else {
            warn!(job_id = %job_id, "Job row vanished before failure handling");
            tx.rollback().await?;
            return Ok(());
        };

        if job.state != JobState::Running {
            // A competing path (janitor, another worker) already moved it.
            debug!(job_id = %job_id, state = %job.state, "Job no longer RUNNING; skipping failure record");
            tx.rollback().await?;
            return Ok(());
        }

        job.set_failure_reason(reason);
        job.record_failed_attempt();

        if !self.retry.is_exhausted(job.attempts) {
            job.transition(JobState::Queued);
            tx.save(&mut job).await?;

            // The queue push stays inside the failure transaction: a push
            // failure downgrades the outcome to FAILED instead of leaving a
            // phantom QUEUED row behind.
            match self.queue.push(job.id).await {
                Ok(()) => {
                    tx.commit().await?;
                    counter!(names::JOBS_RETRIED_TOTAL).increment(1);
                    warn!(
                        job_id = %job.id,
                        attempts = job.attempts,
                        max_attempts = self.retry.max_attempts,
                        reason,
                        "Job attempt failed; requeued"
                    );
                    Ok(())
                }
                Err(push_err) => {
                    job.transition(JobState::Failed);
                    tx.save(&mut job).await?;
                    tx.commit().await?;
                    counter!(names::JOBS_FAILED_TOTAL).increment(1);
                    error!(
                        job_id = %job.id,
                        error = %push_err,
                        "Queue push failed during retry; job marked FAILED"
                    );
                    if let Some(sweep_id) = job.sweep_id {
                        self.notify_sweep(sweep_id).await;
                    }
                    Ok(())
                }
            }
        } else {
            job.transition(JobState::Failed);
            tx.save(&mut job).await?;
            tx.commit().await?;
            counter!(names::JOBS_FAILED_TOTAL).increment(1);
            error!(
                job_id = %job.id,
                attempts = job.attempts,
                reason,
                "Job permanently failed"
            );
            if let Some(sweep_id) = job.sweep_id {
                self.notify_sweep(sweep_id).await;
            }
            Ok(())
        }
    }

    async fn notify_sweep(&self, sweep_id: SweepId) {
        if let Err(e) = self.notifier.on_child_terminal(sweep_id).await {
            // Lost notifications self-heal on the next child's recount.
            error!(sweep_id = %sweep_id, error = %e, "Sweep notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        seed_job, InMemoryDispatchQueue, InMemoryJobStore, RecordingNotifier, StubMarketData,
    };
    use chrono::NaiveDate;
    use quantra_core::JobSpec;

    fn spec() -> JobSpec {
        JobSpec {
            strategy: "BuyAndHold".to_string(),
            symbol: "AAPL".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            parameters: serde_json::json!({}),
            initial_capital: 10_000.0,
        }
    }

    struct Harness {
        store: Arc<InMemoryJobStore>,
        queue: Arc<InMemoryDispatchQueue>,
        notifier: Arc<RecordingNotifier>,
        executor: JobExecutor,
    }

    fn harness(with_data: bool) -> Harness {
        let store = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(InMemoryDispatchQueue::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let market_data = Arc::new(StubMarketData::new(with_data));
        let executor = JobExecutor::new(
            store.clone(),
            queue.clone(),
            market_data,
            Arc::new(StrategyRegistry::standard()),
            RetryPolicy::default(),
            notifier.clone(),
        );
        Harness {
            store,
            queue,
            notifier,
            executor,
        }
    }

    #[tokio::test]
    async fn test_happy_path_completes_and_writes_one_result() {
        let h = harness(true);
        let job_id = h.store.insert(seed_job(spec(), JobState::Queued, None));

        h.executor.execute(job_id).await.unwrap();

        let job = h.store.get(job_id);
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.attempts, 0);
        assert_eq!(h.store.result_count(job_id), 1);
        assert!(h.notifier.calls().is_empty());
    }

    #[tokio::test]
    async fn test_completed_delivery_is_a_noop() {
        let h = harness(true);
        let job_id = h.store.insert(seed_job(spec(), JobState::Queued, None));
        h.executor.execute(job_id).await.unwrap();
        let version_after = h.store.get(job_id).version;

        // Simulated duplicate delivery.
        h.executor.execute(job_id).await.unwrap();

        assert_eq!(h.store.get(job_id).version, version_after);
        assert_eq!(h.store.result_count(job_id), 1);
    }

    #[tokio::test]
    async fn test_running_delivery_declines_without_side_effects() {
        let h = harness(true);
        let job_id = h.store.insert(seed_job(spec(), JobState::Running, None));

        h.executor.execute(job_id).await.unwrap();

        let job = h.store.get(job_id);
        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.version, 0);
        assert_eq!(h.store.result_count(job_id), 0);
    }

    #[tokio::test]
    async fn test_missing_row_is_dropped() {
        let h = harness(true);
        h.executor.execute(JobId::new(999)).await.unwrap();
        assert!(h.queue.drain().is_empty());
    }

    #[tokio::test]
    async fn test_missing_data_requeues_with_incremented_attempts() {
        let h = harness(false);
        let job_id = h.store.insert(seed_job(spec(), JobState::Queued, None));

        h.executor.execute(job_id).await.unwrap();

        let job = h.store.get(job_id);
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.attempts, 1);
        assert!(job.failure_reason.as_ref().unwrap().contains("missing market data"));
        assert_eq!(h.queue.drain(), vec![job_id]);
    }

    #[tokio::test]
    async fn test_deterministic_failure_drains_to_failed_in_max_attempts() {
        let h = harness(false);
        let job_id = h.store.insert(seed_job(spec(), JobState::Queued, None));

        for _ in 0..3 {
            h.executor.execute(job_id).await.unwrap();
        }

        let job = h.store.get(job_id);
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 3);
        assert!(job.failure_reason.as_ref().unwrap().contains("missing market data"));
        assert_eq!(h.store.result_count(job_id), 0);
        // Two requeues happened before the terminal failure.
        assert_eq!(h.queue.drain().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_job_is_not_retried_on_resubmission_path_but_requeue_executes() {
        // A FAILED job popped off the queue proceeds through the claim: the
        // requeue path re-executes it.
        let h = harness(true);
        let mut job = seed_job(spec(), JobState::Failed, None);
        job.attempts = 3;
        let job_id = h.store.insert(job);

        h.executor.execute(job_id).await.unwrap();

        assert_eq!(h.store.get(job_id).state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_queue_push_failure_downgrades_to_failed() {
        let h = harness(false);
        let job_id = h.store.insert(seed_job(spec(), JobState::Queued, None));
        h.queue.fail_pushes(true);

        h.executor.execute(job_id).await.unwrap();

        let job = h.store.get(job_id);
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn test_terminal_failure_notifies_sweep() {
        let h = harness(false);
        let sweep_id = SweepId::new(5);
        let job_id = h
            .store
            .insert(seed_job(spec(), JobState::Queued, Some(sweep_id)));

        for _ in 0..3 {
            h.executor.execute(job_id).await.unwrap();
        }

        assert_eq!(h.notifier.calls(), vec![sweep_id]);
    }

    #[tokio::test]
    async fn test_completion_notifies_sweep() {
        let h = harness(true);
        let sweep_id = SweepId::new(9);
        let job_id = h
            .store
            .insert(seed_job(spec(), JobState::Queued, Some(sweep_id)));

        h.executor.execute(job_id).await.unwrap();

        assert_eq!(h.notifier.calls(), vec![sweep_id]);
    }

    #[tokio::test]
    async fn test_stale_completion_discards_result_silently() {
        let h = harness(true);
        let job_id = h.store.insert(seed_job(spec(), JobState::Queued, None));

        // Mutate the row between the claim and the completion save.
        h.store.bump_version_after_next_commit(job_id);

        h.executor.execute(job_id).await.unwrap();

        assert_eq!(h.store.result_count(job_id), 0);
    }
}
