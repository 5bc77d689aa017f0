//! Unified error types for all layers of the application.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all layers of Quantra.
///
/// This enum provides a comprehensive set of error variants that cover
/// domain, orchestration, infrastructure, and presentation layer errors.
#[derive(Error, Debug)]
pub enum QuantraError {
    // ============ Domain Errors ============
    /// Resource not found
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Deduplication key collision on insert
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Optimistic concurrency token mismatch on save
    #[error("Stale version: {resource_type} with id {id} was modified concurrently")]
    StaleVersion {
        resource_type: &'static str,
        id: String,
    },

    // ============ Infrastructure Errors ============
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Dispatch queue backend error
    #[error("Queue error: {0}")]
    Queue(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ============ Internal Errors ============
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl QuantraError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Validation(_) => 400,
            Self::DuplicateKey(_) => 409,
            Self::StaleVersion { .. }
            | Self::Database(_)
            | Self::Queue(_)
            | Self::Configuration(_)
            | Self::Internal(_)
            | Self::Other(_) => 500,
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::DuplicateKey(_) => "DUPLICATE_KEY",
            Self::StaleVersion { .. } => "STALE_VERSION",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Queue(_) => "QUEUE_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a not found error for a resource.
    #[must_use]
    pub fn not_found<T: ToString>(resource_type: &'static str, id: T) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a stale version error for a resource.
    #[must_use]
    pub fn stale_version<T: ToString>(resource_type: &'static str, id: T) -> Self {
        Self::StaleVersion {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a database error.
    #[must_use]
    pub fn database<T: Into<String>>(message: T) -> Self {
        Self::Database(message.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error reports a stale optimistic token.
    #[must_use]
    pub const fn is_stale_version(&self) -> bool {
        matches!(self, Self::StaleVersion { .. })
    }

    /// Checks if this error is retriable.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Queue(_))
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for QuantraError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound {
                resource_type: "database_row",
                id: "unknown".to_string(),
            },
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    return Self::DuplicateKey(db_err.message().to_string());
                }
                Self::Database(err.to_string())
            }
            _ => Self::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for QuantraError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON serialization error: {}", err))
    }
}

/// Serializable error response for API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional field-level errors for validation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

/// Field-level validation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct FieldError {
    /// Field name
    pub field: String,
    /// Error message
    pub message: String,
    /// Error code
    pub code: String,
}

impl ErrorResponse {
    /// Creates a new error response from a `QuantraError`.
    #[must_use]
    pub fn from_error(error: &QuantraError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
            details: None,
        }
    }

    /// Sets field-level validation errors.
    #[must_use]
    pub fn with_details(mut self, details: Vec<FieldError>) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<&QuantraError> for ErrorResponse {
    fn from(error: &QuantraError) -> Self {
        Self::from_error(error)
    }
}
