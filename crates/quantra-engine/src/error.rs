//! Kernel error types.

use thiserror::Error;

/// Result type for kernel operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors reported by the computation kernel.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested symbol/range has no market data.
    #[error("No market data available for the requested range")]
    MissingData,

    /// No factory is registered under the requested strategy name.
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    /// A strategy rejected its parameter blob.
    #[error("Invalid strategy parameter: {0}")]
    InvalidParameter(String),

    /// The backtest configuration itself is unusable.
    #[error("Invalid backtest configuration: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    /// Returns true for precondition failures (missing inputs rather than
    /// faults raised mid-computation).
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::MissingData | Self::UnknownStrategy(_) | Self::InvalidConfig(_)
        )
    }
}
