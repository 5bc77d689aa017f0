//! Metrics for job orchestration monitoring.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Metric names for the orchestration core.
pub mod names {
    /// Total jobs pushed to the dispatch queue.
    pub const JOBS_ENQUEUED_TOTAL: &str = "quantra_jobs_enqueued_total";
    /// Total jobs popped for processing.
    pub const JOBS_DEQUEUED_TOTAL: &str = "quantra_jobs_dequeued_total";
    /// Total jobs completed successfully.
    pub const JOBS_COMPLETED_TOTAL: &str = "quantra_jobs_completed_total";
    /// Total jobs that reached terminal failure.
    pub const JOBS_FAILED_TOTAL: &str = "quantra_jobs_failed_total";
    /// Total jobs requeued for another attempt.
    pub const JOBS_RETRIED_TOTAL: &str = "quantra_jobs_retried_total";
    /// Total stale jobs recovered by the janitor.
    pub const JOBS_RECOVERED_TOTAL: &str = "quantra_jobs_recovered_total";

    /// Backtest execution duration in seconds.
    pub const JOB_DURATION_SECONDS: &str = "quantra_job_duration_seconds";

    /// Active workers count.
    pub const WORKERS_ACTIVE: &str = "quantra_workers_active";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        names::JOBS_ENQUEUED_TOTAL,
        "Total number of jobs pushed to the dispatch queue"
    );
    describe_counter!(
        names::JOBS_DEQUEUED_TOTAL,
        "Total number of jobs popped for processing"
    );
    describe_counter!(
        names::JOBS_COMPLETED_TOTAL,
        "Total number of jobs completed successfully"
    );
    describe_counter!(
        names::JOBS_FAILED_TOTAL,
        "Total number of jobs that reached terminal failure"
    );
    describe_counter!(
        names::JOBS_RETRIED_TOTAL,
        "Total number of jobs requeued for another attempt"
    );
    describe_counter!(
        names::JOBS_RECOVERED_TOTAL,
        "Total number of stale jobs recovered by the janitor"
    );
    describe_histogram!(
        names::JOB_DURATION_SECONDS,
        "Backtest execution duration in seconds"
    );
    describe_gauge!(names::WORKERS_ACTIVE, "Number of active workers");
}
