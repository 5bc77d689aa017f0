//! # Quantra Service
//!
//! Business logic for the backtest orchestration surface: the submission
//! service (idempotent create-and-enqueue) and the sweep coordinator
//! (parameter-grid fan-out with best-child aggregation). Canonicalization
//! of job specs into dedup keys lives here as the single chokepoint shared
//! by both paths.

pub mod canonical;
pub mod dto;
pub mod submission_service;
pub mod sweep_service;

pub use canonical::{canonical_json, canonical_spec, child_dedup_key, dedup_key};
pub use dto::*;
pub use submission_service::{SubmissionService, SubmissionServiceImpl};
pub use sweep_service::{SweepCoordinator, SweepService};
