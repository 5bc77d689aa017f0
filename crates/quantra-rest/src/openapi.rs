//! OpenAPI documentation configuration.

use quantra_core::{ErrorResponse, FieldError, JobId, JobState, ResultId, SweepId};
use quantra_service::{
    BacktestResultResponse, JobStatusResponse, SubmissionResponse, SubmitBacktestRequest,
    SubmitSweepRequest, SweepStatusResponse, SweepStrategyRequest, SweepSubmissionResponse,
};
use utoipa::OpenApi;

/// OpenAPI documentation for the Quantra API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Quantra API",
        version = "0.1.0",
        description = "Strategy backtest orchestration service",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    paths(
        crate::controllers::backtest_controller::submit_backtest,
        crate::controllers::backtest_controller::get_backtest,
        crate::controllers::sweep_controller::submit_sweep,
        crate::controllers::sweep_controller::get_sweep,
    ),
    components(
        schemas(
            JobId,
            SweepId,
            ResultId,
            JobState,
            ErrorResponse,
            FieldError,
            SubmitBacktestRequest,
            SubmissionResponse,
            BacktestResultResponse,
            JobStatusResponse,
            SubmitSweepRequest,
            SweepStrategyRequest,
            SweepSubmissionResponse,
            SweepStatusResponse,
        )
    ),
    tags(
        (name = "backtests", description = "Backtest submission and status"),
        (name = "sweeps", description = "Parameter sweep coordination")
    )
)]
pub struct ApiDoc;
