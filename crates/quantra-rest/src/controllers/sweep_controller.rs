//! Parameter sweep controller.

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
use quantra_core::{ErrorResponse, SweepId};
use quantra_service::{SubmitSweepRequest, SweepStatusResponse, SweepSubmissionResponse};
use tracing::debug;

/// Submit a parameter sweep.
#[utoipa::path(
    post,
    path = "/backtests/sweeps",
    tag = "sweeps",
    request_body = SubmitSweepRequest,
    responses(
        (status = 201, description = "Sweep accepted and children enqueued", body = SweepSubmissionResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
pub async fn submit_sweep(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<SubmitSweepRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SweepSubmissionResponse>>), AppError> {
    debug!(name = %request.name, strategies = request.strategies.len(), "Submit sweep request");

    let response = state.sweeps.submit_sweep(request).await?;
    Ok(created(response))
}

/// Get a sweep's status, counters, and best child when selected.
#[utoipa::path(
    get,
    path = "/backtests/sweeps/{id}",
    tag = "sweeps",
    params(
        ("id" = i64, Path, description = "Sweep ID")
    ),
    responses(
        (status = 200, description = "Sweep status", body = SweepStatusResponse),
        (status = 404, description = "Sweep not found", body = ErrorResponse)
    )
)]
pub async fn get_sweep(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<SweepStatusResponse> {
    debug!(sweep_id = id, "Get sweep request");

    let response = state.sweeps.get_sweep(SweepId::new(id)).await?;
    ok(response)
}
