//! Backtest submission and status controller.

use crate::{
    extractors::ValidatedJson,
    responses::{created, ok, ApiResponse, ApiResult, AppError},
    state::AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use quantra_core::{ErrorResponse, JobId};
use quantra_service::{JobStatusResponse, SubmissionResponse, SubmitBacktestRequest};
use tracing::debug;

/// Submit a backtest.
#[utoipa::path(
    post,
    path = "/backtests",
    tag = "backtests",
    request_body = SubmitBacktestRequest,
    responses(
        (status = 201, description = "Backtest accepted (or an identical one already exists)", body = SubmissionResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
pub async fn submit_backtest(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<SubmitBacktestRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SubmissionResponse>>), AppError> {
    debug!(strategy = %request.strategy, symbol = %request.symbol, "Submit backtest request");

    let response = state.submissions.submit(request).await?;
    Ok(created(response))
}

/// Get a backtest's status and newest result.
#[utoipa::path(
    get,
    path = "/backtests/{id}",
    tag = "backtests",
    params(
        ("id" = i64, Path, description = "Backtest job ID")
    ),
    responses(
        (status = 200, description = "Backtest status", body = JobStatusResponse),
        (status = 404, description = "Backtest not found", body = ErrorResponse)
    )
)]
pub async fn get_backtest(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<JobStatusResponse> {
    debug!(job_id = id, "Get backtest request");

    let response = state.submissions.get_backtest(JobId::new(id)).await?;
    ok(response)
}
