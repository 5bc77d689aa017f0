//! Validation utilities.

use crate::{FieldError, QuantraError};
use validator::{Validate, ValidationError, ValidationErrors};

/// Extension trait for validation.
pub trait ValidateExt: Validate {
    /// Validates the struct and returns a `QuantraError` on failure.
    fn validate_request(&self) -> Result<(), QuantraError> {
        self.validate().map_err(validation_errors_to_quantra_error)
    }
}

impl<T: Validate> ValidateExt for T {}

/// Converts `validator::ValidationErrors` to `QuantraError`.
#[must_use]
pub fn validation_errors_to_quantra_error(errors: ValidationErrors) -> QuantraError {
    let field_errors: Vec<FieldError> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| FieldError {
                field: (*field).to_string(),
                message: error
                    .message
                    .as_ref()
                    .map_or_else(|| error.code.to_string(), |m| m.to_string()),
                code: error.code.to_string(),
            })
        })
        .collect();

    let message = field_errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ");

    QuantraError::Validation(message)
}

/// Common validation functions.
pub mod rules {
    use super::ValidationError;

    /// Validates that a string is not blank (not empty after trimming).
    pub fn not_blank(value: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::new("not_blank"));
        }
        Ok(())
    }

    /// Validates that a capital amount is strictly positive.
    pub fn positive_capital(value: f64) -> Result<(), ValidationError> {
        if value <= 0.0 || !value.is_finite() {
            return Err(ValidationError::new("positive_capital"));
        }
        Ok(())
    }
}
