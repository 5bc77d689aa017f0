//! Parameter sweep aggregate and optimization metric selection.

use crate::{BacktestResult, JobId, JobState, SweepId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parent aggregate coordinating a fan-out of jobs over a parameter grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sweep {
    pub id: SweepId,
    pub name: String,
    pub description: Option<String>,
    /// Reuses the job state set; only Queued/Running/Completed occur.
    pub state: JobState,
    pub total_children: u32,
    pub completed_children: u32,
    pub failed_children: u32,
    /// Requested optimization metric name, as submitted.
    pub optimization_metric: String,
    pub best_job_id: Option<JobId>,
    pub best_metric_value: Option<f64>,
    /// Optimistic concurrency token, incremented on every save.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sweep {
    /// Returns true once every child has reached a terminal state.
    #[must_use]
    pub fn all_children_terminal(&self) -> bool {
        self.completed_children + self.failed_children == self.total_children
    }

    /// Moves the sweep to a new lifecycle state.
    pub fn transition(&mut self, state: JobState) {
        self.state = state;
    }
}

/// A sweep row about to be created; the store assigns identity, zeroes the
/// counters, and stamps the initial QUEUED state.
#[derive(Debug, Clone)]
pub struct NewSweep {
    pub name: String,
    pub description: Option<String>,
    pub optimization_metric: String,
    pub total_children: u32,
}

/// The metric a sweep optimizes over, resolved from the requested name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationMetric {
    TotalReturn,
    SharpeRatio,
    SortinoRatio,
    Cagr,
    WinRate,
    /// Compared on the negated drawdown, so the shallowest drawdown wins.
    MaxDrawdown,
}

impl OptimizationMetric {
    /// Resolves a requested metric name, case-insensitively.
    ///
    /// Unrecognized names fall back to the Sharpe ratio.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "totalreturn" => Self::TotalReturn,
            "sharperatio" => Self::SharpeRatio,
            "sortinoratio" => Self::SortinoRatio,
            "cagr" => Self::Cagr,
            "winrate" => Self::WinRate,
            "maxdrawdown" => Self::MaxDrawdown,
            _ => Self::SharpeRatio,
        }
    }

    /// Extracts the comparable value from a result; larger is always better.
    #[must_use]
    pub fn extract(self, result: &BacktestResult) -> f64 {
        match self {
            Self::TotalReturn => result.total_return,
            Self::SharpeRatio => result.sharpe_ratio,
            Self::SortinoRatio => result.sortino_ratio,
            Self::Cagr => result.cagr,
            Self::WinRate => result.win_rate,
            Self::MaxDrawdown => -result.max_drawdown,
        }
    }
}
