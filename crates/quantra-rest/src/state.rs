//! Application state for Axum handlers.

use quantra_service::{SubmissionService, SweepService};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub submissions: Arc<dyn SubmissionService>,
    pub sweeps: Arc<dyn SweepService>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(submissions: Arc<dyn SubmissionService>, sweeps: Arc<dyn SweepService>) -> Self {
        Self {
            submissions,
            sweeps,
        }
    }
}
