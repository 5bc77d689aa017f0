//! MySQL job store implementation.

use crate::traits::{JobStore, JobStoreTx};
use crate::DatabasePool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quantra_core::{
    BacktestResult, Job, JobId, JobSpec, JobState, NewBacktestResult, QuantraError, QuantraResult,
    ResultId, SweepId,
};
use sqlx::mysql::MySql;
use sqlx::{FromRow, QueryBuilder, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// MySQL job store implementation.
#[derive(Clone)]
pub struct MySqlJobStore {
    pool: DatabasePool,
}

impl MySqlJobStore {
    /// Creates a new MySQL job store.
    #[must_use]
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a job.
#[derive(Debug, FromRow)]
struct JobRow {
    id: i64,
    dedup_key: String,
    strategy: String,
    symbol: String,
    start_date: chrono::NaiveDate,
    end_date: chrono::NaiveDate,
    parameters: String,
    initial_capital: f64,
    state: String,
    attempts: u32,
    sweep_id: Option<i64>,
    version: i64,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = QuantraError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let state: JobState = row
            .state
            .parse()
            .map_err(|e: String| QuantraError::Internal(format!("Invalid state in database: {}", e)))?;

        let parameters = serde_json::from_str(&row.parameters)
            .map_err(|e| QuantraError::Internal(format!("Invalid parameters in database: {}", e)))?;

        Ok(Job {
            id: JobId::new(row.id),
            dedup_key: row.dedup_key,
            spec: JobSpec {
                strategy: row.strategy,
                symbol: row.symbol,
                start_date: row.start_date,
                end_date: row.end_date,
                parameters,
                initial_capital: row.initial_capital,
            },
            state,
            attempts: row.attempts,
            sweep_id: row.sweep_id.map(SweepId::new),
            version: row.version,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database row representation of a backtest result.
#[derive(Debug, FromRow)]
struct ResultRow {
    id: i64,
    job_id: i64,
    total_return: f64,
    cagr: f64,
    volatility: f64,
    sharpe_ratio: f64,
    sortino_ratio: f64,
    max_drawdown: f64,
    win_rate: f64,
    execution_time_ms: i64,
    trade_log: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ResultRow> for BacktestResult {
    type Error = QuantraError;

    fn try_from(row: ResultRow) -> Result<Self, Self::Error> {
        let trade_log = serde_json::from_str(&row.trade_log)
            .map_err(|e| QuantraError::Internal(format!("Invalid trade log in database: {}", e)))?;

        Ok(BacktestResult {
            id: ResultId::new(row.id),
            job_id: JobId::new(row.job_id),
            total_return: row.total_return,
            cagr: row.cagr,
            volatility: row.volatility,
            sharpe_ratio: row.sharpe_ratio,
            sortino_ratio: row.sortino_ratio,
            max_drawdown: row.max_drawdown,
            win_rate: row.win_rate,
            execution_time_ms: row.execution_time_ms,
            trade_log,
            created_at: row.created_at,
        })
    }
}

const JOB_COLUMNS: &str = "id, dedup_key, strategy, symbol, start_date, end_date, parameters, \
     initial_capital, state, attempts, sweep_id, version, failure_reason, created_at, updated_at";

const RESULT_COLUMNS: &str = "id, job_id, total_return, cagr, volatility, sharpe_ratio, \
     sortino_ratio, max_drawdown, win_rate, execution_time_ms, trade_log, created_at";

fn insert_result_sql() -> &'static str {
    "INSERT INTO backtest_results \
     (job_id, total_return, cagr, volatility, sharpe_ratio, sortino_ratio, max_drawdown, \
      win_rate, execution_time_ms, trade_log) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
}

#[async_trait]
impl JobStore for MySqlJobStore {
    async fn create_job(
        &self,
        spec: &JobSpec,
        dedup_key: &str,
        sweep_id: Option<SweepId>,
    ) -> QuantraResult<Job> {
        debug!("Creating job with dedup key: {}", dedup_key);

        let parameters = serde_json::to_string(&spec.parameters)?;

        let result = sqlx::query(
            "INSERT INTO backtest_jobs \
             (dedup_key, strategy, symbol, start_date, end_date, parameters, initial_capital, \
              state, attempts, sweep_id, version) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, 0)",
        )
        .bind(dedup_key)
        .bind(&spec.strategy)
        .bind(&spec.symbol)
        .bind(spec.start_date)
        .bind(spec.end_date)
        .bind(&parameters)
        .bind(spec.initial_capital)
        .bind(JobState::Submitted.as_str())
        .bind(sweep_id.map(SweepId::into_inner))
        .execute(self.pool.inner())
        .await?;

        let id = JobId::new(result.last_insert_id() as i64);
        self.find_job(id)
            .await?
            .ok_or_else(|| QuantraError::internal(format!("Job {} vanished after insert", id)))
    }

    async fn find_by_dedup_key(&self, dedup_key: &str) -> QuantraResult<Option<Job>> {
        debug!("Finding job by dedup key: {}", dedup_key);

        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM backtest_jobs WHERE dedup_key = ?",
            JOB_COLUMNS
        ))
        .bind(dedup_key)
        .fetch_optional(self.pool.inner())
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn find_job(&self, id: JobId) -> QuantraResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM backtest_jobs WHERE id = ?",
            JOB_COLUMNS
        ))
        .bind(id.into_inner())
        .fetch_optional(self.pool.inner())
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn begin(&self) -> QuantraResult<Box<dyn JobStoreTx>> {
        let tx = self.pool.inner().begin().await?;
        Ok(Box::new(MySqlJobStoreTx { tx }))
    }

    async fn count_children_by_state(
        &self,
        sweep_id: SweepId,
        state: JobState,
    ) -> QuantraResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM backtest_jobs WHERE sweep_id = ? AND state = ?",
        )
        .bind(sweep_id.into_inner())
        .bind(state.as_str())
        .fetch_one(self.pool.inner())
        .await?;

        Ok(count as u64)
    }

    async fn list_children(&self, sweep_id: SweepId) -> QuantraResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM backtest_jobs WHERE sweep_id = ? ORDER BY id",
            JOB_COLUMNS
        ))
        .bind(sweep_id.into_inner())
        .fetch_all(self.pool.inner())
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn write_result(&self, result: &NewBacktestResult) -> QuantraResult<ResultId> {
        let trade_log = serde_json::to_string(&result.trade_log)?;

        let outcome = sqlx::query(insert_result_sql())
            .bind(result.job_id.into_inner())
            .bind(result.total_return)
            .bind(result.cagr)
            .bind(result.volatility)
            .bind(result.sharpe_ratio)
            .bind(result.sortino_ratio)
            .bind(result.max_drawdown)
            .bind(result.win_rate)
            .bind(result.execution_time_ms)
            .bind(&trade_log)
            .execute(self.pool.inner())
            .await?;

        Ok(ResultId::new(outcome.last_insert_id() as i64))
    }

    async fn latest_result_for(&self, job_id: JobId) -> QuantraResult<Option<BacktestResult>> {
        let row = sqlx::query_as::<_, ResultRow>(&format!(
            "SELECT {} FROM backtest_results WHERE job_id = ? ORDER BY id DESC LIMIT 1",
            RESULT_COLUMNS
        ))
        .bind(job_id.into_inner())
        .fetch_optional(self.pool.inner())
        .await?;

        row.map(BacktestResult::try_from).transpose()
    }

    async fn read_results_for(
        &self,
        job_ids: &[JobId],
    ) -> QuantraResult<HashMap<JobId, BacktestResult>> {
        if job_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut builder: QueryBuilder<MySql> = QueryBuilder::new(format!(
            "SELECT {} FROM backtest_results WHERE job_id IN (",
            RESULT_COLUMNS
        ));
        let mut separated = builder.separated(", ");
        for id in job_ids {
            separated.push_bind(id.into_inner());
        }
        builder.push(") ORDER BY id DESC");

        let rows: Vec<ResultRow> = builder.build_query_as().fetch_all(self.pool.inner()).await?;

        // Rows arrive newest-first; the first row per job wins.
        let mut results = HashMap::new();
        for row in rows {
            let result = BacktestResult::try_from(row)?;
            results.entry(result.job_id).or_insert(result);
        }
        Ok(results)
    }

    async fn find_stale_jobs(&self, older_than: Duration) -> QuantraResult<Vec<Job>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than)
                .map_err(|e| QuantraError::internal(format!("Invalid staleness window: {}", e)))?;

        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM backtest_jobs \
             WHERE state IN ('RUNNING', 'SUBMITTED') AND updated_at < ? ORDER BY updated_at",
            JOB_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(self.pool.inner())
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }
}

/// Transaction-scoped job store operations over a live MySQL transaction.
pub struct MySqlJobStoreTx {
    tx: Transaction<'static, MySql>,
}

#[async_trait]
impl JobStoreTx for MySqlJobStoreTx {
    async fn lock_for_update(&mut self, id: JobId) -> QuantraResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM backtest_jobs WHERE id = ? FOR UPDATE",
            JOB_COLUMNS
        ))
        .bind(id.into_inner())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn save(&mut self, job: &mut Job) -> QuantraResult<()> {
        let outcome = sqlx::query(
            "UPDATE backtest_jobs \
             SET state = ?, attempts = ?, failure_reason = ?, \
                 version = version + 1, updated_at = CURRENT_TIMESTAMP(6) \
             WHERE id = ? AND version = ?",
        )
        .bind(job.state.as_str())
        .bind(job.attempts)
        .bind(&job.failure_reason)
        .bind(job.id.into_inner())
        .bind(job.version)
        .execute(&mut *self.tx)
        .await?;

        if outcome.rows_affected() == 0 {
            return Err(QuantraError::stale_version("Job", job.id));
        }

        job.version += 1;
        Ok(())
    }

    async fn write_result(&mut self, result: &NewBacktestResult) -> QuantraResult<ResultId> {
        let trade_log = serde_json::to_string(&result.trade_log)?;

        let outcome = sqlx::query(insert_result_sql())
            .bind(result.job_id.into_inner())
            .bind(result.total_return)
            .bind(result.cagr)
            .bind(result.volatility)
            .bind(result.sharpe_ratio)
            .bind(result.sortino_ratio)
            .bind(result.max_drawdown)
            .bind(result.win_rate)
            .bind(result.execution_time_ms)
            .bind(&trade_log)
            .execute(&mut *self.tx)
            .await?;

        Ok(ResultId::new(outcome.last_insert_id() as i64))
    }

    async fn commit(self: Box<Self>) -> QuantraResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> QuantraResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> JobRow {
        JobRow {
            id: 7,
            dedup_key: "deadbeef".to_string(),
            strategy: "BuyAndHold".to_string(),
            symbol: "AAPL".to_string(),
            start_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: chrono::NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            parameters: "{\"window\":10}".to_string(),
            initial_capital: 10_000.0,
            state: "QUEUED".to_string(),
            attempts: 1,
            sweep_id: Some(3),
            version: 4,
            failure_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_job_row_conversion() {
        let job = Job::try_from(sample_row()).unwrap();
        assert_eq!(job.id, JobId::new(7));
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.sweep_id, Some(SweepId::new(3)));
        assert_eq!(job.spec.parameters["window"], 10);
        assert_eq!(job.version, 4);
    }

    #[test]
    fn test_job_row_rejects_unknown_state() {
        let mut row = sample_row();
        row.state = "PAUSED".to_string();
        assert!(Job::try_from(row).is_err());
    }

    #[test]
    fn test_job_row_rejects_malformed_parameters() {
        let mut row = sample_row();
        row.parameters = "{not json".to_string();
        assert!(Job::try_from(row).is_err());
    }

    #[test]
    fn test_result_row_conversion() {
        let row = ResultRow {
            id: 11,
            job_id: 7,
            total_return: 0.25,
            cagr: 0.22,
            volatility: 0.18,
            sharpe_ratio: 1.4,
            sortino_ratio: 1.9,
            max_drawdown: 0.08,
            win_rate: 0.6,
            execution_time_ms: 42,
            trade_log: "[]".to_string(),
            created_at: Utc::now(),
        };
        let result = BacktestResult::try_from(row).unwrap();
        assert_eq!(result.job_id, JobId::new(7));
        assert!(result.trade_log.is_array());
    }
}
