//! Backtest job entity and lifecycle state machine.

use crate::{JobId, SweepId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum stored length of a failure reason, in characters.
pub const MAX_FAILURE_REASON_LEN: usize = 1000;

/// Lifecycle state of a backtest job.
///
/// `Completed` and `Failed` are terminal; `Failed` may be re-entered by the
/// retry path before the attempt budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum JobState {
    /// Persisted but not yet on the dispatch queue.
    Submitted,
    /// On the dispatch queue, waiting for a worker.
    Queued,
    /// Claimed by a worker and executing.
    Running,
    /// Finished with a recorded result.
    Completed,
    /// Exhausted its attempt budget.
    Failed,
}

impl JobState {
    /// Returns true for states with no automatic exit.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns the canonical storage string for this state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUBMITTED" => Ok(Self::Submitted),
            "QUEUED" => Ok(Self::Queued),
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown job state: {}", other)),
        }
    }
}

/// Immutable specification of a backtest run.
///
/// The parameter blob is opaque to the orchestration core: it is hashed for
/// deduplication and forwarded to the computation kernel, never parsed here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Registered strategy name.
    pub strategy: String,
    /// Instrument symbol.
    pub symbol: String,
    /// First date of the closed backtest interval.
    pub start_date: NaiveDate,
    /// Last date of the closed backtest interval.
    pub end_date: NaiveDate,
    /// Opaque strategy parameters.
    pub parameters: serde_json::Value,
    /// Starting capital, strictly positive.
    pub initial_capital: f64,
}

/// A backtest work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Store-assigned identity.
    pub id: JobId,
    /// Digest of the canonical spec; unique across all jobs.
    pub dedup_key: String,
    /// The work to perform.
    pub spec: JobSpec,
    /// Current lifecycle state.
    pub state: JobState,
    /// Number of completed failed attempts; monotone non-decreasing.
    pub attempts: u32,
    /// Parent sweep, when this job is a sweep child.
    pub sweep_id: Option<SweepId>,
    /// Optimistic concurrency token, incremented on every save.
    pub version: i64,
    /// Last failure, truncated to [`MAX_FAILURE_REASON_LEN`].
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Returns true once the job has reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Moves the job to a new lifecycle state.
    pub fn transition(&mut self, state: JobState) {
        self.state = state;
    }

    /// Records one more completed failed attempt.
    pub fn record_failed_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Stores the failure reason, truncated to the bounded length.
    pub fn set_failure_reason(&mut self, reason: &str) {
        let truncated: String = reason.chars().take(MAX_FAILURE_REASON_LEN).collect();
        self.failure_reason = Some(truncated);
    }
}
