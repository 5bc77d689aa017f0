//! Submission service: idempotent accept-and-enqueue for backtest jobs.

use crate::canonical;
use crate::dto::{
    BacktestResultResponse, JobStatusResponse, SubmissionResponse, SubmitBacktestRequest,
};
use async_trait::async_trait;
use quantra_core::{
    rules, Interface, Job, JobId, JobSpec, JobState, QuantraError, QuantraResult, ValidateExt,
};
use quantra_engine::StrategyRegistry;
use quantra_jobs::DispatchQueue;
use quantra_store::JobStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Submission service trait.
#[async_trait]
pub trait SubmissionService: Interface + Send + Sync {
    /// Accepts a backtest submission, deduplicating identical specs.
    async fn submit(&self, request: SubmitBacktestRequest) -> QuantraResult<SubmissionResponse>;

    /// Reads a job's status, attaching its newest result when present.
    async fn get_backtest(&self, id: JobId) -> QuantraResult<JobStatusResponse>;
}

/// Submission service over the job store and dispatch queue.
pub struct SubmissionServiceImpl {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn DispatchQueue>,
    registry: Arc<StrategyRegistry>,
}

impl SubmissionServiceImpl {
    /// Creates a new submission service.
    #[must_use]
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn DispatchQueue>,
        registry: Arc<StrategyRegistry>,
    ) -> Self {
        Self {
            store,
            queue,
            registry,
        }
    }

    /// Maps and semantically validates a request into a job spec.
    fn to_spec(&self, request: &SubmitBacktestRequest) -> QuantraResult<JobSpec> {
        rules::not_blank(&request.strategy)
            .map_err(|_| QuantraError::validation("strategy must not be blank"))?;
        rules::not_blank(&request.symbol)
            .map_err(|_| QuantraError::validation("symbol must not be blank"))?;
        rules::positive_capital(request.initial_capital)
            .map_err(|_| QuantraError::validation("initialCapital must be positive"))?;
        if request.start_date > request.end_date {
            return Err(QuantraError::validation(
                "startDate must not be after endDate",
            ));
        }

        let strategy = request.strategy.trim().to_string();
        if !self.registry.contains(&strategy) {
            return Err(QuantraError::validation(format!(
                "unknown strategy: {}",
                strategy
            )));
        }

        Ok(JobSpec {
            strategy,
            symbol: request.symbol.trim().to_string(),
            start_date: request.start_date,
            end_date: request.end_date,
            parameters: request.parameters.clone(),
            initial_capital: request.initial_capital,
        })
    }

    /// Shapes the response for a job that already exists.
    async fn respond_existing(&self, job: Job) -> QuantraResult<SubmissionResponse> {
        debug!(job_id = %job.id, state = %job.state, "Identical spec already submitted");

        let (message, result) = match job.state {
            JobState::Completed => {
                let result = self.store.latest_result_for(job.id).await?;
                (None, result.map(BacktestResultResponse::from))
            }
            JobState::Failed => (
                Some(format!(
                    "job previously failed after exhausting {} attempts; re-submission does not retry",
                    job.attempts
                )),
                None,
            ),
            _ => (None, None),
        };

        Ok(SubmissionResponse {
            job_id: job.id,
            state: job.state,
            is_existing: true,
            message,
            result,
        })
    }
}

/// Pushes a freshly created job and moves it SUBMITTED → QUEUED.
///
/// The row is created before the push, so a worker racing ahead of the
/// transition always finds it; workers tolerate any non-terminal state.
pub(crate) async fn enqueue_job(
    store: &Arc<dyn JobStore>,
    queue: &Arc<dyn DispatchQueue>,
    job: Job,
) -> QuantraResult<Job> {
    queue
        .push(job.id)
        .await
        .map_err(|e| QuantraError::Queue(e.to_string()))?;

    let mut tx = store.begin().await?;
    let Some(mut fresh) = tx.lock_for_update(job.id).await? else {
        tx.rollback().await?;
        return Err(QuantraError::internal(format!(
            "Job {} vanished during enqueue",
            job.id
        )));
    };

    if fresh.state == JobState::Submitted {
        fresh.transition(JobState::Queued);
        tx.save(&mut fresh).await?;
        tx.commit().await?;
    } else {
        // A worker already advanced it past QUEUED.
        tx.rollback().await?;
    }
    Ok(fresh)
}

#[async_trait]
impl SubmissionService for SubmissionServiceImpl {
    async fn submit(&self, request: SubmitBacktestRequest) -> QuantraResult<SubmissionResponse> {
        request.validate_request()?;
        let spec = self.to_spec(&request)?;
        let dedup_key = canonical::dedup_key(&spec);

        if let Some(existing) = self.store.find_by_dedup_key(&dedup_key).await? {
            return self.respond_existing(existing).await;
        }

        match self.store.create_job(&spec, &dedup_key, None).await {
            Ok(job) => {
                let job = enqueue_job(&self.store, &self.queue, job).await?;
                info!(job_id = %job.id, strategy = %job.spec.strategy, symbol = %job.spec.symbol, "Backtest submitted");
                Ok(SubmissionResponse {
                    job_id: job.id,
                    state: job.state,
                    is_existing: false,
                    message: None,
                    result: None,
                })
            }
            Err(QuantraError::DuplicateKey(_)) => {
                // Lost the insert race; the winner's job is authoritative.
                warn!("Concurrent submission of an identical spec; returning the existing job");
                let existing = self
                    .store
                    .find_by_dedup_key(&dedup_key)
                    .await?
                    .ok_or_else(|| {
                        QuantraError::internal("Job vanished after duplicate-key collision")
                    })?;
                self.respond_existing(existing).await
            }
            Err(e) => Err(e),
        }
    }

    async fn get_backtest(&self, id: JobId) -> QuantraResult<JobStatusResponse> {
        let job = self
            .store
            .find_job(id)
            .await?
            .ok_or_else(|| QuantraError::not_found("Backtest", id))?;
        let result = self.store.latest_result_for(id).await?;
        Ok(JobStatusResponse::from_job(job, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mockall::mock;
    use quantra_jobs::testing::{InMemoryDispatchQueue, InMemoryJobStore};
    use quantra_jobs::{JobError, JobResult};
    use std::time::Duration;

    mock! {
        pub Queue {}

        #[async_trait]
        impl DispatchQueue for Queue {
            async fn push(&self, job_id: JobId) -> JobResult<()>;
            async fn pop(&self, timeout: Duration) -> JobResult<Option<JobId>>;
            async fn len(&self) -> JobResult<u64>;
            async fn health_check(&self) -> JobResult<()>;
        }
    }

    fn request() -> SubmitBacktestRequest {
        SubmitBacktestRequest {
            strategy: "BuyAndHold".to_string(),
            symbol: "AAPL".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            parameters: serde_json::json!({}),
            initial_capital: 10_000.0,
        }
    }

    fn service_with_queue(
        store: Arc<InMemoryJobStore>,
        queue: Arc<dyn DispatchQueue>,
    ) -> SubmissionServiceImpl {
        SubmissionServiceImpl::new(store, queue, Arc::new(StrategyRegistry::standard()))
    }

    #[tokio::test]
    async fn test_fresh_submission_creates_and_queues() {
        let store = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(InMemoryDispatchQueue::new());
        let service = service_with_queue(store.clone(), queue.clone());

        let response = service.submit(request()).await.unwrap();

        assert!(!response.is_existing);
        assert_eq!(response.state, JobState::Queued);
        assert_eq!(store.job_count(), 1);
        assert_eq!(queue.drain(), vec![response.job_id]);

        let job = store.get(response.job_id);
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.dedup_key.len(), 64);
    }

    #[tokio::test]
    async fn test_resubmission_returns_the_same_job_without_a_push() {
        let store = Arc::new(InMemoryJobStore::new());

        let first = {
            let queue = Arc::new(InMemoryDispatchQueue::new());
            let service = service_with_queue(store.clone(), queue);
            service.submit(request()).await.unwrap()
        };

        // Second submission must not touch the queue at all.
        let mut mock_queue = MockQueue::new();
        mock_queue.expect_push().never();
        let service = service_with_queue(store.clone(), Arc::new(mock_queue));

        let second = service.submit(request()).await.unwrap();

        assert!(second.is_existing);
        assert_eq!(second.job_id, first.job_id);
        assert_eq!(store.job_count(), 1);
    }

    #[tokio::test]
    async fn test_completed_job_resubmission_inlines_the_result() {
        let store = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(InMemoryDispatchQueue::new());
        let service = service_with_queue(store.clone(), queue.clone());

        let response = service.submit(request()).await.unwrap();

        // Drive the job to COMPLETED with a stored result.
        {
            let mut job = store.get(response.job_id);
            job.transition(JobState::Completed);
            let mut tx = store.begin().await.unwrap();
            tx.save(&mut job).await.unwrap();
            tx.commit().await.unwrap();
            store
                .write_result(&quantra_core::NewBacktestResult {
                    job_id: response.job_id,
                    total_return: 0.2,
                    cagr: 0.2,
                    volatility: 0.1,
                    sharpe_ratio: 1.5,
                    sortino_ratio: 2.0,
                    max_drawdown: 0.05,
                    win_rate: 1.0,
                    execution_time_ms: 7,
                    trade_log: serde_json::json!([]),
                })
                .await
                .unwrap();
        }

        let again = service.submit(request()).await.unwrap();
        assert!(again.is_existing);
        assert_eq!(again.state, JobState::Completed);
        let result = again.result.expect("completed job should inline its result");
        assert!((result.sharpe_ratio - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_job_resubmission_notes_exhausted_attempts() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut mock_queue = MockQueue::new();
        // The first submission pushes; the resubmission must not.
        mock_queue
            .expect_push()
            .times(1)
            .returning(|_| Ok(()));
        let service = service_with_queue(store.clone(), Arc::new(mock_queue));

        let response = service.submit(request()).await.unwrap();
        {
            let mut job = store.get(response.job_id);
            job.transition(JobState::Failed);
            job.attempts = 3;
            let mut tx = store.begin().await.unwrap();
            tx.save(&mut job).await.unwrap();
            tx.commit().await.unwrap();
        }

        let again = service.submit(request()).await.unwrap();
        assert!(again.is_existing);
        assert_eq!(again.state, JobState::Failed);
        assert!(again.message.unwrap().contains("3 attempts"));
        // The job is untouched by the resubmission.
        assert_eq!(store.get(response.job_id).state, JobState::Failed);
    }

    #[tokio::test]
    async fn test_unknown_strategy_is_rejected() {
        let store = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(InMemoryDispatchQueue::new());
        let service = service_with_queue(store.clone(), queue);

        let mut bad = request();
        bad.strategy = "MomentumMagic".to_string();
        let err = service.submit(bad).await.unwrap_err();
        assert!(matches!(err, QuantraError::Validation(_)));
        assert_eq!(store.job_count(), 0);
    }

    #[tokio::test]
    async fn test_non_positive_capital_is_rejected() {
        let store = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(InMemoryDispatchQueue::new());
        let service = service_with_queue(store, queue);

        let mut bad = request();
        bad.initial_capital = 0.0;
        assert!(matches!(
            service.submit(bad).await.unwrap_err(),
            QuantraError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_inverted_dates_are_rejected() {
        let store = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(InMemoryDispatchQueue::new());
        let service = service_with_queue(store, queue);

        let mut bad = request();
        bad.start_date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert!(matches!(
            service.submit(bad).await.unwrap_err(),
            QuantraError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_queue_push_failure_surfaces_as_queue_error() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut mock_queue = MockQueue::new();
        mock_queue
            .expect_push()
            .returning(|_| Err(JobError::Queue("redis down".to_string())));
        let service = service_with_queue(store.clone(), Arc::new(mock_queue));

        let err = service.submit(request()).await.unwrap_err();
        assert!(matches!(err, QuantraError::Queue(_)));
        // The row exists but was never marked QUEUED; the janitor will
        // re-deliver it.
        let job = store.find_by_dedup_key(&canonical::dedup_key(&JobSpec {
            strategy: "BuyAndHold".to_string(),
            symbol: "AAPL".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            parameters: serde_json::json!({}),
            initial_capital: 10_000.0,
        }))
        .await
        .unwrap()
        .unwrap();
        assert_eq!(job.state, JobState::Submitted);
    }

    #[tokio::test]
    async fn test_get_backtest_not_found() {
        let store = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(InMemoryDispatchQueue::new());
        let service = service_with_queue(store, queue);

        let err = service.get_backtest(JobId::new(404)).await.unwrap_err();
        assert!(matches!(err, QuantraError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_get_backtest_returns_status() {
        let store = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(InMemoryDispatchQueue::new());
        let service = service_with_queue(store.clone(), queue);

        let response = service.submit(request()).await.unwrap();
        let status = service.get_backtest(response.job_id).await.unwrap();

        assert_eq!(status.job_id, response.job_id);
        assert_eq!(status.state, JobState::Queued);
        assert_eq!(status.strategy, "BuyAndHold");
        assert!(status.result.is_none());
    }
}
