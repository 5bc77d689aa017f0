//! Sweep coordinator: parameter-grid fan-out and best-child aggregation.

use crate::canonical;
use crate::dto::{SubmitSweepRequest, SweepStatusResponse, SweepSubmissionResponse};
use crate::submission_service::enqueue_job;
use async_trait::async_trait;
use quantra_core::{
    rules, Interface, JobId, JobSpec, JobState, NewSweep, OptimizationMetric, QuantraError,
    QuantraResult, SweepId, ValidateExt,
};
use quantra_engine::StrategyRegistry;
use quantra_jobs::{DispatchQueue, SweepNotifier};
use quantra_store::{JobStore, SweepStore};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sweep service trait.
#[async_trait]
pub trait SweepService: Interface + Send + Sync {
    /// Expands a sweep request into child jobs and enqueues them all.
    async fn submit_sweep(
        &self,
        request: SubmitSweepRequest,
    ) -> QuantraResult<SweepSubmissionResponse>;

    /// Reads a sweep's status.
    async fn get_sweep(&self, id: SweepId) -> QuantraResult<SweepStatusResponse>;
}

/// Coordinates sweeps over the job and sweep stores.
///
/// Also implements [`SweepNotifier`]: the executor calls back here whenever
/// a child reaches a terminal state. Counter updates are serialized under
/// the sweep row lock and recounted from the child set, so a lost
/// notification self-heals on the next one.
pub struct SweepCoordinator {
    sweeps: Arc<dyn SweepStore>,
    jobs: Arc<dyn JobStore>,
    queue: Arc<dyn DispatchQueue>,
    registry: Arc<StrategyRegistry>,
}

impl SweepCoordinator {
    /// Creates a new sweep coordinator.
    #[must_use]
    pub fn new(
        sweeps: Arc<dyn SweepStore>,
        jobs: Arc<dyn JobStore>,
        queue: Arc<dyn DispatchQueue>,
        registry: Arc<StrategyRegistry>,
    ) -> Self {
        Self {
            sweeps,
            jobs,
            queue,
            registry,
        }
    }

    /// Enumerates the distinct (strategy, parameter-combination) pairs of a
    /// request. Duplicate combinations collapse; an entry with no declared
    /// combinations yields one child with default parameters.
    fn enumerate_children(
        &self,
        request: &SubmitSweepRequest,
    ) -> QuantraResult<Vec<(String, serde_json::Value)>> {
        let mut seen = HashSet::new();
        let mut pairs = Vec::new();

        for entry in &request.strategies {
            let strategy = entry.strategy.trim().to_string();
            if !self.registry.contains(&strategy) {
                return Err(QuantraError::validation(format!(
                    "unknown strategy: {}",
                    strategy
                )));
            }

            let combinations: Vec<serde_json::Value> = if entry.parameter_combinations.is_empty() {
                vec![serde_json::Value::Object(serde_json::Map::new())]
            } else {
                entry.parameter_combinations.clone()
            };

            for parameters in combinations {
                let fingerprint =
                    format!("{}\u{0}{}", strategy, canonical::canonical_json(&parameters));
                if seen.insert(fingerprint) {
                    pairs.push((strategy.clone(), parameters));
                } else {
                    warn!(strategy = %strategy, "Duplicate parameter combination in sweep request; collapsed");
                }
            }
        }

        Ok(pairs)
    }

    fn validate(&self, request: &SubmitSweepRequest) -> QuantraResult<()> {
        request.validate_request()?;
        rules::not_blank(&request.name)
            .map_err(|_| QuantraError::validation("name must not be blank"))?;
        rules::not_blank(&request.symbol)
            .map_err(|_| QuantraError::validation("symbol must not be blank"))?;
        rules::positive_capital(request.initial_capital)
            .map_err(|_| QuantraError::validation("initialCapital must be positive"))?;
        if request.start_date > request.end_date {
            return Err(QuantraError::validation(
                "startDate must not be after endDate",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SweepService for SweepCoordinator {
    async fn submit_sweep(
        &self,
        request: SubmitSweepRequest,
    ) -> QuantraResult<SweepSubmissionResponse> {
        self.validate(&request)?;
        let pairs = self.enumerate_children(&request)?;
        if pairs.is_empty() {
            return Err(QuantraError::validation(
                "sweep expands to zero parameter combinations",
            ));
        }

        let sweep = self
            .sweeps
            .create_sweep(&NewSweep {
                name: request.name.trim().to_string(),
                description: request.description.clone(),
                optimization_metric: request.optimization_metric.trim().to_string(),
                total_children: pairs.len() as u32,
            })
            .await?;

        info!(
            sweep_id = %sweep.id,
            children = pairs.len(),
            metric = %sweep.optimization_metric,
            "Sweep created; fanning out children"
        );

        let symbol = request.symbol.trim().to_string();
        let mut child_job_ids = Vec::with_capacity(pairs.len());
        for (strategy, parameters) in pairs {
            let spec = JobSpec {
                strategy,
                symbol: symbol.clone(),
                start_date: request.start_date,
                end_date: request.end_date,
                parameters,
                initial_capital: request.initial_capital,
            };
            let dedup_key = canonical::child_dedup_key(sweep.id, &spec);

            let job = self.jobs.create_job(&spec, &dedup_key, Some(sweep.id)).await?;
            let job = enqueue_job(&self.jobs, &self.queue, job).await?;
            child_job_ids.push(job.id);
        }

        Ok(SweepSubmissionResponse {
            sweep_id: sweep.id,
            state: sweep.state,
            total_children: sweep.total_children,
            child_job_ids,
        })
    }

    async fn get_sweep(&self, id: SweepId) -> QuantraResult<SweepStatusResponse> {
        let sweep = self
            .sweeps
            .find_sweep(id)
            .await?
            .ok_or_else(|| QuantraError::not_found("Sweep", id))?;
        Ok(SweepStatusResponse::from(sweep))
    }
}

#[async_trait]
impl SweepNotifier for SweepCoordinator {
    async fn on_child_terminal(&self, sweep_id: SweepId) -> QuantraResult<()> {
        let mut tx = self.sweeps.begin().await?;

        let Some(mut sweep) = tx.lock_for_update(sweep_id).await? else {
            warn!(sweep_id = %sweep_id, "Notification for an unknown sweep");
            return Ok(());
        };

        // Recount from the child set rather than incrementing: self-healing
        // under lost notifications.
        let completed = self
            .jobs
            .count_children_by_state(sweep_id, JobState::Completed)
            .await? as u32;
        let failed = self
            .jobs
            .count_children_by_state(sweep_id, JobState::Failed)
            .await? as u32;

        sweep.completed_children = completed;
        sweep.failed_children = failed;

        if completed + failed < sweep.total_children {
            sweep.transition(JobState::Running);
            tx.save(&mut sweep).await?;
            tx.commit().await?;
            debug!(
                sweep_id = %sweep_id,
                completed,
                failed,
                total = sweep.total_children,
                "Sweep progressed"
            );
            return Ok(());
        }

        // All children terminal: select the best completed child.
        let children = self.jobs.list_children(sweep_id).await?;
        let completed_ids: Vec<JobId> = children
            .iter()
            .filter(|j| j.state == JobState::Completed)
            .map(|j| j.id)
            .collect();

        let results = self.jobs.read_results_for(&completed_ids).await?;
        let metric = OptimizationMetric::parse(&sweep.optimization_metric);

        let mut best: Option<(JobId, f64)> = None;
        // Children arrive ordered by id; strictly-greater comparison breaks
        // ties toward the smaller child id.
        for id in &completed_ids {
            if let Some(result) = results.get(id) {
                let value = metric.extract(result);
                if best.map_or(true, |(_, best_value)| value > best_value) {
                    best = Some((*id, value));
                }
            }
        }

        sweep.best_job_id = best.map(|(id, _)| id);
        sweep.best_metric_value = best.map(|(_, value)| value);
        sweep.transition(JobState::Completed);
        tx.save(&mut sweep).await?;
        tx.commit().await?;

        info!(
            sweep_id = %sweep_id,
            completed,
            failed,
            best_job_id = ?sweep.best_job_id,
            best_metric_value = ?sweep.best_metric_value,
            "Sweep completed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::SweepStrategyRequest;
    use chrono::NaiveDate;
    use quantra_core::NewBacktestResult;
    use quantra_jobs::testing::{InMemoryDispatchQueue, InMemoryJobStore, InMemorySweepStore};

    fn request(combos: Vec<serde_json::Value>) -> SubmitSweepRequest {
        SubmitSweepRequest {
            name: "ma-grid".to_string(),
            description: Some("MA crossover grid".to_string()),
            symbol: "AAPL".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            initial_capital: 10_000.0,
            optimization_metric: "sharpeRatio".to_string(),
            strategies: vec![SweepStrategyRequest {
                strategy: "MovingAverageCrossover".to_string(),
                parameter_combinations: combos,
            }],
        }
    }

    fn four_combos() -> Vec<serde_json::Value> {
        vec![
            serde_json::json!({"shortWindow": 5, "longWindow": 20}),
            serde_json::json!({"shortWindow": 10, "longWindow": 30}),
            serde_json::json!({"shortWindow": 15, "longWindow": 45}),
            serde_json::json!({"shortWindow": 20, "longWindow": 60}),
        ]
    }

    struct Harness {
        sweeps: Arc<InMemorySweepStore>,
        jobs: Arc<InMemoryJobStore>,
        queue: Arc<InMemoryDispatchQueue>,
        coordinator: SweepCoordinator,
    }

    fn harness() -> Harness {
        let sweeps = Arc::new(InMemorySweepStore::new());
        let jobs = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(InMemoryDispatchQueue::new());
        let coordinator = SweepCoordinator::new(
            sweeps.clone(),
            jobs.clone(),
            queue.clone(),
            Arc::new(StrategyRegistry::standard()),
        );
        Harness {
            sweeps,
            jobs,
            queue,
            coordinator,
        }
    }

    /// Drives a child to a terminal state and fires the notification the
    /// executor would send.
    async fn finish_child(
        h: &Harness,
        sweep_id: SweepId,
        job_id: JobId,
        state: JobState,
        sharpe: Option<f64>,
    ) {
        let mut job = h.jobs.get(job_id);
        job.transition(state);
        let mut tx = h.jobs.begin().await.unwrap();
        tx.save(&mut job).await.unwrap();
        tx.commit().await.unwrap();

        if let Some(sharpe) = sharpe {
            h.jobs
                .write_result(&NewBacktestResult {
                    job_id,
                    total_return: 0.1,
                    cagr: 0.1,
                    volatility: 0.2,
                    sharpe_ratio: sharpe,
                    sortino_ratio: 1.0,
                    max_drawdown: 0.1,
                    win_rate: 0.5,
                    execution_time_ms: 3,
                    trade_log: serde_json::json!([]),
                })
                .await
                .unwrap();
        }

        h.coordinator.on_child_terminal(sweep_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_sweep_fans_out_children() {
        let h = harness();

        let response = h.coordinator.submit_sweep(request(four_combos())).await.unwrap();

        assert_eq!(response.total_children, 4);
        assert_eq!(response.child_job_ids.len(), 4);
        assert_eq!(h.queue.drain().len(), 4);

        for id in &response.child_job_ids {
            let child = h.jobs.get(*id);
            assert_eq!(child.state, JobState::Queued);
            assert_eq!(child.sweep_id, Some(response.sweep_id));
        }

        let sweep = h.sweeps.get(response.sweep_id);
        assert_eq!(sweep.state, JobState::Queued);
        assert_eq!(sweep.total_children, 4);
    }

    #[tokio::test]
    async fn test_duplicate_combinations_collapse() {
        let h = harness();
        let combos = vec![
            serde_json::json!({"shortWindow": 5, "longWindow": 20}),
            serde_json::json!({"longWindow": 20, "shortWindow": 5}),
        ];

        let response = h.coordinator.submit_sweep(request(combos)).await.unwrap();

        assert_eq!(response.total_children, 1);
        assert_eq!(h.jobs.job_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_combination_list_yields_one_default_child() {
        let h = harness();

        let response = h.coordinator.submit_sweep(request(vec![])).await.unwrap();

        assert_eq!(response.total_children, 1);
        let child = h.jobs.get(response.child_job_ids[0]);
        assert!(child.spec.parameters.as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_strategy_in_sweep_is_rejected() {
        let h = harness();
        let mut bad = request(four_combos());
        bad.strategies[0].strategy = "Nope".to_string();

        assert!(matches!(
            h.coordinator.submit_sweep(bad).await.unwrap_err(),
            QuantraError::Validation(_)
        ));
        assert_eq!(h.jobs.job_count(), 0);
    }

    #[tokio::test]
    async fn test_progress_notifications_move_sweep_to_running() {
        let h = harness();
        let response = h.coordinator.submit_sweep(request(four_combos())).await.unwrap();

        finish_child(
            &h,
            response.sweep_id,
            response.child_job_ids[0],
            JobState::Completed,
            Some(1.1),
        )
        .await;

        let sweep = h.sweeps.get(response.sweep_id);
        assert_eq!(sweep.state, JobState::Running);
        assert_eq!(sweep.completed_children, 1);
        assert_eq!(sweep.failed_children, 0);
        assert!(sweep.best_job_id.is_none());
    }

    #[tokio::test]
    async fn test_sweep_selects_best_child_by_sharpe() {
        let h = harness();
        let response = h.coordinator.submit_sweep(request(four_combos())).await.unwrap();
        let ids = response.child_job_ids.clone();

        for (id, sharpe) in ids.iter().zip([1.1, 2.1, 1.8, 1.2]) {
            finish_child(&h, response.sweep_id, *id, JobState::Completed, Some(sharpe)).await;
        }

        let sweep = h.sweeps.get(response.sweep_id);
        assert_eq!(sweep.state, JobState::Completed);
        assert_eq!(sweep.completed_children, 4);
        assert_eq!(sweep.best_job_id, Some(ids[1]));
        assert!((sweep.best_metric_value.unwrap() - 2.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_shallowest_drawdown_wins_for_max_drawdown_metric() {
        let h = harness();
        let mut req = request(four_combos());
        req.optimization_metric = "maxDrawdown".to_string();
        let response = h.coordinator.submit_sweep(req).await.unwrap();
        let ids = response.child_job_ids.clone();

        // Store distinct drawdowns through the sharpe plumbing below.
        for (i, id) in ids.iter().enumerate() {
            let mut job = h.jobs.get(*id);
            job.transition(JobState::Completed);
            let mut tx = h.jobs.begin().await.unwrap();
            tx.save(&mut job).await.unwrap();
            tx.commit().await.unwrap();
            h.jobs
                .write_result(&NewBacktestResult {
                    job_id: *id,
                    total_return: 0.1,
                    cagr: 0.1,
                    volatility: 0.2,
                    sharpe_ratio: 1.0,
                    sortino_ratio: 1.0,
                    max_drawdown: [0.20, 0.05, 0.12, 0.30][i],
                    win_rate: 0.5,
                    execution_time_ms: 3,
                    trade_log: serde_json::json!([]),
                })
                .await
                .unwrap();
            h.coordinator.on_child_terminal(response.sweep_id).await.unwrap();
        }

        let sweep = h.sweeps.get(response.sweep_id);
        assert_eq!(sweep.best_job_id, Some(ids[1]));
        assert!((sweep.best_metric_value.unwrap() - (-0.05)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_ties_break_toward_smaller_child_id() {
        let h = harness();
        let response = h.coordinator.submit_sweep(request(four_combos())).await.unwrap();
        let ids = response.child_job_ids.clone();

        for id in &ids {
            finish_child(&h, response.sweep_id, *id, JobState::Completed, Some(1.5)).await;
        }

        let sweep = h.sweeps.get(response.sweep_id);
        assert_eq!(sweep.best_job_id, Some(ids[0]));
    }

    #[tokio::test]
    async fn test_all_failed_sweep_completes_without_best_child() {
        let h = harness();
        let response = h.coordinator.submit_sweep(request(four_combos())).await.unwrap();

        for id in &response.child_job_ids {
            finish_child(&h, response.sweep_id, *id, JobState::Failed, None).await;
        }

        let sweep = h.sweeps.get(response.sweep_id);
        assert_eq!(sweep.state, JobState::Completed);
        assert_eq!(sweep.failed_children, 4);
        assert!(sweep.best_job_id.is_none());
        assert!(sweep.best_metric_value.is_none());
    }

    #[tokio::test]
    async fn test_mixed_outcome_selects_among_completed_only() {
        let h = harness();
        let response = h.coordinator.submit_sweep(request(four_combos())).await.unwrap();
        let ids = response.child_job_ids.clone();

        finish_child(&h, response.sweep_id, ids[0], JobState::Failed, None).await;
        finish_child(&h, response.sweep_id, ids[1], JobState::Completed, Some(0.9)).await;
        finish_child(&h, response.sweep_id, ids[2], JobState::Failed, None).await;
        finish_child(&h, response.sweep_id, ids[3], JobState::Completed, Some(0.4)).await;

        let sweep = h.sweeps.get(response.sweep_id);
        assert_eq!(sweep.state, JobState::Completed);
        assert_eq!(sweep.completed_children, 2);
        assert_eq!(sweep.failed_children, 2);
        assert_eq!(sweep.best_job_id, Some(ids[1]));
    }

    #[tokio::test]
    async fn test_get_sweep_not_found() {
        let h = harness();
        assert!(matches!(
            h.coordinator.get_sweep(SweepId::new(77)).await.unwrap_err(),
            QuantraError::NotFound { .. }
        ));
    }
}
