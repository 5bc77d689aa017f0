//! Store trait definitions.
//!
//! Plain reads run directly against the pool; writes that must observe the
//! row-lock discipline go through the transaction traits, which pair
//! `lock_for_update` with an optimistic-version `save` inside a single
//! database transaction.

use async_trait::async_trait;
use chrono::NaiveDate;
use quantra_core::{
    BacktestResult, Interface, Job, JobId, JobSpec, JobState, MarketPoint, NewBacktestResult,
    NewSweep, QuantraResult, ResultId, Sweep, SweepId,
};
use std::collections::HashMap;
use std::time::Duration;

/// Job store trait.
#[async_trait]
pub trait JobStore: Interface + Send + Sync {
    /// Creates a new job in SUBMITTED state.
    ///
    /// Fails with `QuantraError::DuplicateKey` when the dedup key already
    /// exists.
    async fn create_job(
        &self,
        spec: &JobSpec,
        dedup_key: &str,
        sweep_id: Option<SweepId>,
    ) -> QuantraResult<Job>;

    /// Finds a job by its deduplication key.
    async fn find_by_dedup_key(&self, dedup_key: &str) -> QuantraResult<Option<Job>>;

    /// Finds a job by ID without locking.
    async fn find_job(&self, id: JobId) -> QuantraResult<Option<Job>>;

    /// Opens a transaction for lock-and-save sequences.
    async fn begin(&self) -> QuantraResult<Box<dyn JobStoreTx>>;

    /// Counts the children of a sweep in the given state.
    async fn count_children_by_state(
        &self,
        sweep_id: SweepId,
        state: JobState,
    ) -> QuantraResult<u64>;

    /// Lists all children of a sweep.
    async fn list_children(&self, sweep_id: SweepId) -> QuantraResult<Vec<Job>>;

    /// Writes a result row in its own transaction.
    async fn write_result(&self, result: &NewBacktestResult) -> QuantraResult<ResultId>;

    /// Returns the newest result row for a job, if any.
    async fn latest_result_for(&self, job_id: JobId) -> QuantraResult<Option<BacktestResult>>;

    /// Bulk-reads the newest result per job in a single round-trip.
    async fn read_results_for(
        &self,
        job_ids: &[JobId],
    ) -> QuantraResult<HashMap<JobId, BacktestResult>>;

    /// Finds RUNNING or SUBMITTED jobs whose last update is older than the
    /// given age (janitor support).
    async fn find_stale_jobs(&self, older_than: Duration) -> QuantraResult<Vec<Job>>;
}

/// Transaction-scoped job store operations.
///
/// `lock_for_update` + `save` within one transaction provide a serializable
/// update on a single job row. Dropping the transaction without commit
/// rolls it back.
#[async_trait]
pub trait JobStoreTx: Send {
    /// Acquires a row-level exclusive lock on the job, blocking concurrent
    /// lockers of the same row.
    async fn lock_for_update(&mut self, id: JobId) -> QuantraResult<Option<Job>>;

    /// Rewrites the mutable fields of the job.
    ///
    /// Fails with `QuantraError::StaleVersion` when the observed optimistic
    /// token no longer matches the stored one; on success the entity's
    /// token is incremented in place.
    async fn save(&mut self, job: &mut Job) -> QuantraResult<()>;

    /// Writes a result row inside this transaction.
    async fn write_result(&mut self, result: &NewBacktestResult) -> QuantraResult<ResultId>;

    /// Commits the transaction.
    async fn commit(self: Box<Self>) -> QuantraResult<()>;

    /// Rolls the transaction back explicitly.
    async fn rollback(self: Box<Self>) -> QuantraResult<()>;
}

/// Sweep store trait.
#[async_trait]
pub trait SweepStore: Interface + Send + Sync {
    /// Creates a new sweep in QUEUED state with zeroed counters.
    async fn create_sweep(&self, new_sweep: &NewSweep) -> QuantraResult<Sweep>;

    /// Finds a sweep by ID without locking.
    async fn find_sweep(&self, id: SweepId) -> QuantraResult<Option<Sweep>>;

    /// Opens a transaction for lock-and-save sequences on sweep rows.
    async fn begin(&self) -> QuantraResult<Box<dyn SweepStoreTx>>;
}

/// Transaction-scoped sweep store operations.
#[async_trait]
pub trait SweepStoreTx: Send {
    /// Acquires a row-level exclusive lock on the sweep.
    async fn lock_for_update(&mut self, id: SweepId) -> QuantraResult<Option<Sweep>>;

    /// Rewrites the mutable fields of the sweep under the optimistic token.
    async fn save(&mut self, sweep: &mut Sweep) -> QuantraResult<()>;

    /// Commits the transaction.
    async fn commit(self: Box<Self>) -> QuantraResult<()>;
}

/// Market data store trait.
#[async_trait]
pub trait MarketDataStore: Interface + Send + Sync {
    /// Returns the chronologically sorted series for the symbol with dates
    /// in the closed interval `[start, end]`.
    async fn find_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> QuantraResult<Vec<MarketPoint>>;
}
