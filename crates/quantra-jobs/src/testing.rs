//! In-memory test doubles for the orchestration seams.
//!
//! The fake store reproduces the contract the executor depends on
//! (optimistic version checks, transactional staging with rollback)
//! without a database, so the lifecycle protocol can be exercised end to
//! end in unit tests.

use crate::error::{JobError, JobResult};
use crate::executor::SweepNotifier;
use crate::market_data::{synthetic_series, MarketDataProvider};
use crate::queue::DispatchQueue;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use quantra_core::{
    BacktestResult, Job, JobId, JobSpec, JobState, MarketPoint, NewBacktestResult, NewSweep,
    QuantraError, QuantraResult, ResultId, Sweep, SweepId,
};
use quantra_store::{JobStore, JobStoreTx, SweepStore, SweepStoreTx};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Builds an unsaved job entity; [`InMemoryJobStore::insert`] assigns
/// identity and a unique dedup key.
pub fn seed_job(spec: JobSpec, state: JobState, sweep_id: Option<SweepId>) -> Job {
    Job {
        id: JobId::new(0),
        dedup_key: String::new(),
        spec,
        state,
        attempts: 0,
        sweep_id,
        version: 0,
        failure_reason: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[derive(Default)]
struct StoreInner {
    jobs: HashMap<i64, Job>,
    results: Vec<BacktestResult>,
    next_job_id: i64,
    next_result_id: i64,
    bump_after_commit: Option<i64>,
    row_locks: HashMap<i64, Arc<tokio::sync::Mutex<()>>>,
}

/// In-memory job store with real optimistic-version semantics.
pub struct InMemoryJobStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                next_job_id: 1,
                next_result_id: 1,
                ..StoreInner::default()
            })),
        }
    }

    /// Inserts a seeded job, assigning identity.
    pub fn insert(&self, mut job: Job) -> JobId {
        let mut inner = self.inner.lock();
        let id = inner.next_job_id;
        inner.next_job_id += 1;
        job.id = JobId::new(id);
        if job.dedup_key.is_empty() {
            job.dedup_key = format!("seed-{}", id);
        }
        inner.jobs.insert(id, job);
        JobId::new(id)
    }

    /// Reads a job back; panics when absent.
    pub fn get(&self, id: JobId) -> Job {
        self.inner.lock().jobs[&id.into_inner()].clone()
    }

    pub fn job_count(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    pub fn result_count(&self, id: JobId) -> usize {
        self.inner
            .lock()
            .results
            .iter()
            .filter(|r| r.job_id == id)
            .count()
    }

    /// Backdates a job's `updated_at` (janitor staleness tests).
    pub fn set_updated_at(&self, id: JobId, updated_at: chrono::DateTime<Utc>) {
        if let Some(job) = self.inner.lock().jobs.get_mut(&id.into_inner()) {
            job.updated_at = updated_at;
        }
    }

    /// After the next commit, bump the stored version of the job by one,
    /// simulating a competing writer slipping in between transactions.
    pub fn bump_version_after_next_commit(&self, id: JobId) {
        self.inner.lock().bump_after_commit = Some(id.into_inner());
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create_job(
        &self,
        spec: &JobSpec,
        dedup_key: &str,
        sweep_id: Option<SweepId>,
    ) -> QuantraResult<Job> {
        let mut inner = self.inner.lock();
        if inner.jobs.values().any(|j| j.dedup_key == dedup_key) {
            return Err(QuantraError::DuplicateKey(dedup_key.to_string()));
        }
        let id = inner.next_job_id;
        inner.next_job_id += 1;
        let job = Job {
            id: JobId::new(id),
            dedup_key: dedup_key.to_string(),
            spec: spec.clone(),
            state: JobState::Submitted,
            attempts: 0,
            sweep_id,
            version: 0,
            failure_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        inner.jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn find_by_dedup_key(&self, dedup_key: &str) -> QuantraResult<Option<Job>> {
        Ok(self
            .inner
            .lock()
            .jobs
            .values()
            .find(|j| j.dedup_key == dedup_key)
            .cloned())
    }

    async fn find_job(&self, id: JobId) -> QuantraResult<Option<Job>> {
        Ok(self.inner.lock().jobs.get(&id.into_inner()).cloned())
    }

    async fn begin(&self) -> QuantraResult<Box<dyn JobStoreTx>> {
        Ok(Box::new(InMemoryJobStoreTx {
            inner: self.inner.clone(),
            staged_jobs: Vec::new(),
            staged_results: Vec::new(),
            held_locks: Vec::new(),
        }))
    }

    async fn count_children_by_state(
        &self,
        sweep_id: SweepId,
        state: JobState,
    ) -> QuantraResult<u64> {
        Ok(self
            .inner
            .lock()
            .jobs
            .values()
            .filter(|j| j.sweep_id == Some(sweep_id) && j.state == state)
            .count() as u64)
    }

    async fn list_children(&self, sweep_id: SweepId) -> QuantraResult<Vec<Job>> {
        let mut children: Vec<Job> = self
            .inner
            .lock()
            .jobs
            .values()
            .filter(|j| j.sweep_id == Some(sweep_id))
            .cloned()
            .collect();
        children.sort_by_key(|j| j.id);
        Ok(children)
    }

    async fn write_result(&self, result: &NewBacktestResult) -> QuantraResult<ResultId> {
        let mut inner = self.inner.lock();
        let id = inner.next_result_id;
        inner.next_result_id += 1;
        inner.results.push(materialize_result(result, id));
        Ok(ResultId::new(id))
    }

    async fn latest_result_for(&self, job_id: JobId) -> QuantraResult<Option<BacktestResult>> {
        Ok(self
            .inner
            .lock()
            .results
            .iter()
            .filter(|r| r.job_id == job_id)
            .max_by_key(|r| r.id)
            .cloned())
    }

    async fn read_results_for(
        &self,
        job_ids: &[JobId],
    ) -> QuantraResult<HashMap<JobId, BacktestResult>> {
        let inner = self.inner.lock();
        let mut map = HashMap::new();
        for id in job_ids {
            if let Some(result) = inner
                .results
                .iter()
                .filter(|r| r.job_id == *id)
                .max_by_key(|r| r.id)
            {
                map.insert(*id, result.clone());
            }
        }
        Ok(map)
    }

    async fn find_stale_jobs(&self, older_than: Duration) -> QuantraResult<Vec<Job>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than)
                .map_err(|e| QuantraError::internal(e.to_string()))?;
        Ok(self
            .inner
            .lock()
            .jobs
            .values()
            .filter(|j| {
                matches!(j.state, JobState::Running | JobState::Submitted)
                    && j.updated_at < cutoff
            })
            .cloned()
            .collect())
    }
}

struct InMemoryJobStoreTx {
    inner: Arc<Mutex<StoreInner>>,
    staged_jobs: Vec<Job>,
    staged_results: Vec<NewBacktestResult>,
    held_locks: Vec<tokio::sync::OwnedMutexGuard<()>>,
}

impl InMemoryJobStoreTx {
    fn effective(&self, id: i64) -> Option<Job> {
        self.staged_jobs
            .iter()
            .rev()
            .find(|j| j.id.into_inner() == id)
            .cloned()
            .or_else(|| self.inner.lock().jobs.get(&id).cloned())
    }
}

#[async_trait]
impl JobStoreTx for InMemoryJobStoreTx {
    async fn lock_for_update(&mut self, id: JobId) -> QuantraResult<Option<Job>> {
        // Emulates the exclusive row lock: held until commit or rollback.
        let row_lock = {
            let mut inner = self.inner.lock();
            inner
                .row_locks
                .entry(id.into_inner())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        self.held_locks.push(row_lock.lock_owned().await);
        Ok(self.effective(id.into_inner()))
    }

    async fn save(&mut self, job: &mut Job) -> QuantraResult<()> {
        let current = self
            .effective(job.id.into_inner())
            .ok_or_else(|| QuantraError::not_found("Job", job.id))?;
        if current.version != job.version {
            return Err(QuantraError::stale_version("Job", job.id));
        }
        job.version += 1;
        job.updated_at = Utc::now();
        self.staged_jobs.push(job.clone());
        Ok(())
    }

    async fn write_result(&mut self, result: &NewBacktestResult) -> QuantraResult<ResultId> {
        self.staged_results.push(result.clone());
        Ok(ResultId::new(0))
    }

    async fn commit(self: Box<Self>) -> QuantraResult<()> {
        let mut inner = self.inner.lock();
        for job in self.staged_jobs {
            inner.jobs.insert(job.id.into_inner(), job);
        }
        for result in self.staged_results {
            let id = inner.next_result_id;
            inner.next_result_id += 1;
            inner.results.push(materialize_result(&result, id));
        }
        if let Some(id) = inner.bump_after_commit.take() {
            if let Some(job) = inner.jobs.get_mut(&id) {
                job.version += 1;
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> QuantraResult<()> {
        Ok(())
    }
}

fn materialize_result(result: &NewBacktestResult, id: i64) -> BacktestResult {
    BacktestResult {
        id: ResultId::new(id),
        job_id: result.job_id,
        total_return: result.total_return,
        cagr: result.cagr,
        volatility: result.volatility,
        sharpe_ratio: result.sharpe_ratio,
        sortino_ratio: result.sortino_ratio,
        max_drawdown: result.max_drawdown,
        win_rate: result.win_rate,
        execution_time_ms: result.execution_time_ms,
        trade_log: result.trade_log.clone(),
        created_at: Utc::now(),
    }
}

/// In-memory sweep store with optimistic-version semantics.
pub struct InMemorySweepStore {
    inner: Arc<Mutex<SweepInner>>,
}

#[derive(Default)]
struct SweepInner {
    sweeps: HashMap<i64, Sweep>,
    next_id: i64,
}

impl InMemorySweepStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SweepInner {
                next_id: 1,
                ..SweepInner::default()
            })),
        }
    }

    /// Reads a sweep back; panics when absent.
    pub fn get(&self, id: SweepId) -> Sweep {
        self.inner.lock().sweeps[&id.into_inner()].clone()
    }
}

impl Default for InMemorySweepStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SweepStore for InMemorySweepStore {
    async fn create_sweep(&self, new_sweep: &NewSweep) -> QuantraResult<Sweep> {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        let sweep = Sweep {
            id: SweepId::new(id),
            name: new_sweep.name.clone(),
            description: new_sweep.description.clone(),
            state: JobState::Queued,
            total_children: new_sweep.total_children,
            completed_children: 0,
            failed_children: 0,
            optimization_metric: new_sweep.optimization_metric.clone(),
            best_job_id: None,
            best_metric_value: None,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        inner.sweeps.insert(id, sweep.clone());
        Ok(sweep)
    }

    async fn find_sweep(&self, id: SweepId) -> QuantraResult<Option<Sweep>> {
        Ok(self.inner.lock().sweeps.get(&id.into_inner()).cloned())
    }

    async fn begin(&self) -> QuantraResult<Box<dyn SweepStoreTx>> {
        Ok(Box::new(InMemorySweepStoreTx {
            inner: self.inner.clone(),
            staged: Vec::new(),
        }))
    }
}

struct InMemorySweepStoreTx {
    inner: Arc<Mutex<SweepInner>>,
    staged: Vec<Sweep>,
}

#[async_trait]
impl SweepStoreTx for InMemorySweepStoreTx {
    async fn lock_for_update(&mut self, id: SweepId) -> QuantraResult<Option<Sweep>> {
        Ok(self
            .staged
            .iter()
            .rev()
            .find(|s| s.id == id)
            .cloned()
            .or_else(|| self.inner.lock().sweeps.get(&id.into_inner()).cloned()))
    }

    async fn save(&mut self, sweep: &mut Sweep) -> QuantraResult<()> {
        let current = self
            .staged
            .iter()
            .rev()
            .find(|s| s.id == sweep.id)
            .cloned()
            .or_else(|| self.inner.lock().sweeps.get(&sweep.id.into_inner()).cloned())
            .ok_or_else(|| QuantraError::not_found("Sweep", sweep.id))?;
        if current.version != sweep.version {
            return Err(QuantraError::stale_version("Sweep", sweep.id));
        }
        sweep.version += 1;
        sweep.updated_at = Utc::now();
        self.staged.push(sweep.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> QuantraResult<()> {
        let mut inner = self.inner.lock();
        for sweep in self.staged {
            inner.sweeps.insert(sweep.id.into_inner(), sweep);
        }
        Ok(())
    }
}

/// In-memory FIFO dispatch queue.
pub struct InMemoryDispatchQueue {
    items: Mutex<VecDeque<JobId>>,
    fail_push: AtomicBool,
}

impl InMemoryDispatchQueue {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            fail_push: AtomicBool::new(false),
        }
    }

    /// Makes subsequent pushes fail, simulating a dead queue backend.
    pub fn fail_pushes(&self, fail: bool) {
        self.fail_push.store(fail, Ordering::SeqCst);
    }

    /// Removes and returns everything currently queued.
    pub fn drain(&self) -> Vec<JobId> {
        self.items.lock().drain(..).collect()
    }
}

impl Default for InMemoryDispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DispatchQueue for InMemoryDispatchQueue {
    async fn push(&self, job_id: JobId) -> JobResult<()> {
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(JobError::Queue("simulated push failure".to_string()));
        }
        self.items.lock().push_back(job_id);
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> JobResult<Option<JobId>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(id) = self.items.lock().pop_front() {
                return Ok(Some(id));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    async fn len(&self) -> JobResult<u64> {
        Ok(self.items.lock().len() as u64)
    }

    async fn health_check(&self) -> JobResult<()> {
        Ok(())
    }
}

/// Market data provider stub: either a synthetic series or nothing.
pub struct StubMarketData {
    with_data: bool,
}

impl StubMarketData {
    pub fn new(with_data: bool) -> Self {
        Self { with_data }
    }
}

#[async_trait]
impl MarketDataProvider for StubMarketData {
    async fn load(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> QuantraResult<Vec<MarketPoint>> {
        if self.with_data {
            Ok(synthetic_series(symbol, start, end))
        } else {
            Ok(Vec::new())
        }
    }
}

/// Notifier that records the sweep ids it was called with.
pub struct RecordingNotifier {
    calls: Mutex<Vec<SweepId>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<SweepId> {
        self.calls.lock().clone()
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SweepNotifier for RecordingNotifier {
    async fn on_child_terminal(&self, sweep_id: SweepId) -> QuantraResult<()> {
        self.calls.lock().push(sweep_id);
        Ok(())
    }
}
