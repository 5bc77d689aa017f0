//! Persisted backtest result entity.

use crate::{JobId, ResultId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded execution outcome for a completed attempt.
///
/// Retries append result rows rather than rewriting them; readers take the
/// newest row per job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub id: ResultId,
    pub job_id: JobId,
    /// Total return over the interval, as a fraction of initial capital.
    pub total_return: f64,
    /// Compound annual growth rate.
    pub cagr: f64,
    /// Annualized standard deviation of daily returns.
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Largest peak-to-trough decline, stored as a positive fraction.
    pub max_drawdown: f64,
    /// Fraction of closing trades with positive profit.
    pub win_rate: f64,
    /// Wall-clock execution time of the backtest run.
    pub execution_time_ms: i64,
    /// Opaque trade log blob.
    pub trade_log: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A result row about to be written; the store assigns identity.
#[derive(Debug, Clone)]
pub struct NewBacktestResult {
    pub job_id: JobId,
    pub total_return: f64,
    pub cagr: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub execution_time_ms: i64,
    pub trade_log: serde_json::Value,
}
