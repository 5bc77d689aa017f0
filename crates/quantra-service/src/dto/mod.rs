//! Request and response DTOs for the backtest surface.

use chrono::{DateTime, NaiveDate, Utc};
use quantra_core::{BacktestResult, Job, JobId, JobState, Sweep, SweepId};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Request to submit a single backtest.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBacktestRequest {
    #[validate(length(min = 1, max = 100, message = "Strategy name is required"))]
    pub strategy: String,

    #[validate(length(min = 1, max = 32, message = "Symbol is required"))]
    pub symbol: String,

    /// First date of the closed interval, `YYYY-MM-DD`.
    pub start_date: NaiveDate,

    /// Last date of the closed interval, `YYYY-MM-DD`.
    pub end_date: NaiveDate,

    /// Opaque strategy parameters; defaults to an empty map.
    #[serde(default = "empty_parameters")]
    #[schema(value_type = Object)]
    pub parameters: serde_json::Value,

    pub initial_capital: f64,
}

fn empty_parameters() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Outcome of a submission: the job (possibly pre-existing) and its state.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub job_id: JobId,
    pub state: JobState,
    /// True when an identical spec had already been submitted.
    pub is_existing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The stored result, inlined when the job already completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<BacktestResultResponse>,
}

/// Persisted backtest metrics, as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResultResponse {
    pub total_return: f64,
    pub cagr: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub execution_time_ms: i64,
    #[schema(value_type = Object)]
    pub trade_log: serde_json::Value,
}

impl From<BacktestResult> for BacktestResultResponse {
    fn from(result: BacktestResult) -> Self {
        Self {
            total_return: result.total_return,
            cagr: result.cagr,
            volatility: result.volatility,
            sharpe_ratio: result.sharpe_ratio,
            sortino_ratio: result.sortino_ratio,
            max_drawdown: result.max_drawdown,
            win_rate: result.win_rate,
            execution_time_ms: result.execution_time_ms,
            trade_log: result.trade_log,
        }
    }
}

/// Full job status, as returned by the read endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub strategy: String,
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub state: JobState,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep_id: Option<SweepId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<BacktestResultResponse>,
}

impl JobStatusResponse {
    /// Builds the status view, attaching the newest result when present.
    #[must_use]
    pub fn from_job(job: Job, result: Option<BacktestResult>) -> Self {
        Self {
            job_id: job.id,
            strategy: job.spec.strategy,
            symbol: job.spec.symbol,
            start_date: job.spec.start_date,
            end_date: job.spec.end_date,
            initial_capital: job.spec.initial_capital,
            state: job.state,
            attempts: job.attempts,
            failure_reason: job.failure_reason,
            sweep_id: job.sweep_id,
            created_at: job.created_at,
            updated_at: job.updated_at,
            result: result.map(BacktestResultResponse::from),
        }
    }
}

/// One strategy entry in a sweep request.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SweepStrategyRequest {
    #[validate(length(min = 1, max = 100, message = "Strategy name is required"))]
    pub strategy: String,

    /// Parameter combinations to fan out; an empty list means one child
    /// with default parameters.
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub parameter_combinations: Vec<serde_json::Value>,
}

/// Request to submit a parameter sweep.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSweepRequest {
    #[validate(length(min = 1, max = 255, message = "Sweep name is required"))]
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[validate(length(min = 1, max = 32, message = "Symbol is required"))]
    pub symbol: String,

    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,

    /// Metric to optimize; unknown names fall back to the Sharpe ratio.
    #[validate(length(min = 1, max = 64, message = "Optimization metric is required"))]
    pub optimization_metric: String,

    #[validate(nested, length(min = 1, message = "At least one strategy is required"))]
    pub strategies: Vec<SweepStrategyRequest>,
}

/// Outcome of a sweep submission.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SweepSubmissionResponse {
    pub sweep_id: SweepId,
    pub state: JobState,
    pub total_children: u32,
    pub child_job_ids: Vec<JobId>,
}

/// Sweep status with counters and the best child when selected.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SweepStatusResponse {
    pub sweep_id: SweepId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub state: JobState,
    pub total_children: u32,
    pub completed_children: u32,
    pub failed_children: u32,
    pub optimization_metric: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_job_id: Option<JobId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_metric_value: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Sweep> for SweepStatusResponse {
    fn from(sweep: Sweep) -> Self {
        Self {
            sweep_id: sweep.id,
            name: sweep.name,
            description: sweep.description,
            state: sweep.state,
            total_children: sweep.total_children,
            completed_children: sweep.completed_children,
            failed_children: sweep.failed_children,
            optimization_metric: sweep.optimization_metric,
            best_job_id: sweep.best_job_id,
            best_metric_value: sweep.best_metric_value,
            created_at: sweep.created_at,
            updated_at: sweep.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_request_accepts_camel_case() {
        let json = r#"{
            "strategy": "BuyAndHold",
            "symbol": "AAPL",
            "startDate": "2024-01-01",
            "endDate": "2024-12-31",
            "parameters": {},
            "initialCapital": 10000
        }"#;
        let request: SubmitBacktestRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.strategy, "BuyAndHold");
        assert_eq!(request.initial_capital, 10_000.0);
    }

    #[test]
    fn test_parameters_default_to_empty_map() {
        let json = r#"{
            "strategy": "BuyAndHold",
            "symbol": "AAPL",
            "startDate": "2024-01-01",
            "endDate": "2024-12-31",
            "initialCapital": 10000
        }"#;
        let request: SubmitBacktestRequest = serde_json::from_str(json).unwrap();
        assert!(request.parameters.as_object().unwrap().is_empty());
    }

    #[test]
    fn test_blank_strategy_fails_validation() {
        let request = SubmitBacktestRequest {
            strategy: String::new(),
            symbol: "AAPL".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            parameters: serde_json::json!({}),
            initial_capital: 10_000.0,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_submission_response_serializes_camel_case() {
        let response = SubmissionResponse {
            job_id: JobId::new(1),
            state: JobState::Queued,
            is_existing: false,
            message: None,
            result: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["jobId"], 1);
        assert_eq!(json["state"], "QUEUED");
        assert_eq!(json["isExisting"], false);
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_sweep_request_requires_strategies() {
        let request = SubmitSweepRequest {
            name: "grid".to_string(),
            description: None,
            symbol: "AAPL".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            initial_capital: 10_000.0,
            optimization_metric: "sharpeRatio".to_string(),
            strategies: vec![],
        };
        assert!(request.validate().is_err());
    }
}
