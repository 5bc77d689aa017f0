//! MySQL sweep store implementation.

use crate::traits::{SweepStore, SweepStoreTx};
use crate::DatabasePool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quantra_core::{
    JobId, JobState, NewSweep, QuantraError, QuantraResult, Sweep, SweepId,
};
use sqlx::mysql::MySql;
use sqlx::{FromRow, Transaction};
use tracing::debug;

/// MySQL sweep store implementation.
#[derive(Clone)]
pub struct MySqlSweepStore {
    pool: DatabasePool,
}

impl MySqlSweepStore {
    /// Creates a new MySQL sweep store.
    #[must_use]
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a sweep.
#[derive(Debug, FromRow)]
struct SweepRow {
    id: i64,
    name: String,
    description: Option<String>,
    state: String,
    total_children: u32,
    completed_children: u32,
    failed_children: u32,
    optimization_metric: String,
    best_job_id: Option<i64>,
    best_metric_value: Option<f64>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SweepRow> for Sweep {
    type Error = QuantraError;

    fn try_from(row: SweepRow) -> Result<Self, Self::Error> {
        let state: JobState = row
            .state
            .parse()
            .map_err(|e: String| QuantraError::Internal(format!("Invalid state in database: {}", e)))?;

        Ok(Sweep {
            id: SweepId::new(row.id),
            name: row.name,
            description: row.description,
            state,
            total_children: row.total_children,
            completed_children: row.completed_children,
            failed_children: row.failed_children,
            optimization_metric: row.optimization_metric,
            best_job_id: row.best_job_id.map(JobId::new),
            best_metric_value: row.best_metric_value,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SWEEP_COLUMNS: &str = "id, name, description, state, total_children, completed_children, \
     failed_children, optimization_metric, best_job_id, best_metric_value, version, \
     created_at, updated_at";

#[async_trait]
impl SweepStore for MySqlSweepStore {
    async fn create_sweep(&self, new_sweep: &NewSweep) -> QuantraResult<Sweep> {
        debug!("Creating sweep: {}", new_sweep.name);

        let result = sqlx::query(
            "INSERT INTO backtest_sweeps \
             (name, description, state, total_children, completed_children, failed_children, \
              optimization_metric, version) \
             VALUES (?, ?, ?, ?, 0, 0, ?, 0)",
        )
        .bind(&new_sweep.name)
        .bind(&new_sweep.description)
        .bind(JobState::Queued.as_str())
        .bind(new_sweep.total_children)
        .bind(&new_sweep.optimization_metric)
        .execute(self.pool.inner())
        .await?;

        let id = SweepId::new(result.last_insert_id() as i64);
        self.find_sweep(id)
            .await?
            .ok_or_else(|| QuantraError::internal(format!("Sweep {} vanished after insert", id)))
    }

    async fn find_sweep(&self, id: SweepId) -> QuantraResult<Option<Sweep>> {
        let row = sqlx::query_as::<_, SweepRow>(&format!(
            "SELECT {} FROM backtest_sweeps WHERE id = ?",
            SWEEP_COLUMNS
        ))
        .bind(id.into_inner())
        .fetch_optional(self.pool.inner())
        .await?;

        row.map(Sweep::try_from).transpose()
    }

    async fn begin(&self) -> QuantraResult<Box<dyn SweepStoreTx>> {
        let tx = self.pool.inner().begin().await?;
        Ok(Box::new(MySqlSweepStoreTx { tx }))
    }
}

/// Transaction-scoped sweep store operations over a live MySQL transaction.
pub struct MySqlSweepStoreTx {
    tx: Transaction<'static, MySql>,
}

#[async_trait]
impl SweepStoreTx for MySqlSweepStoreTx {
    async fn lock_for_update(&mut self, id: SweepId) -> QuantraResult<Option<Sweep>> {
        let row = sqlx::query_as::<_, SweepRow>(&format!(
            "SELECT {} FROM backtest_sweeps WHERE id = ? FOR UPDATE",
            SWEEP_COLUMNS
        ))
        .bind(id.into_inner())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Sweep::try_from).transpose()
    }

    async fn save(&mut self, sweep: &mut Sweep) -> QuantraResult<()> {
        let outcome = sqlx::query(
            "UPDATE backtest_sweeps \
             SET state = ?, completed_children = ?, failed_children = ?, \
                 best_job_id = ?, best_metric_value = ?, \
                 version = version + 1, updated_at = CURRENT_TIMESTAMP(6) \
             WHERE id = ? AND version = ?",
        )
        .bind(sweep.state.as_str())
        .bind(sweep.completed_children)
        .bind(sweep.failed_children)
        .bind(sweep.best_job_id.map(JobId::into_inner))
        .bind(sweep.best_metric_value)
        .bind(sweep.id.into_inner())
        .bind(sweep.version)
        .execute(&mut *self.tx)
        .await?;

        if outcome.rows_affected() == 0 {
            return Err(QuantraError::stale_version("Sweep", sweep.id));
        }

        sweep.version += 1;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> QuantraResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
