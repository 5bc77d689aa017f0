//! Validated JSON extractor for automatic request validation.

use crate::responses::ApiResponse;
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use quantra_core::{ErrorResponse, FieldError};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors};

/// JSON extractor that validates the deserialized value.
///
/// Returns 400 with field-level error details when parsing or validation
/// fails; handlers only ever see a structurally valid request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T> std::ops::Deref for ValidatedJson<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Rejection type for validated JSON extraction.
pub enum ValidatedJsonRejection {
    /// JSON parsing/deserialization error.
    JsonError(JsonRejection),
    /// Validation error with field-level details.
    ValidationError(ValidationErrors),
}

impl IntoResponse for ValidatedJsonRejection {
    fn into_response(self) -> Response {
        let error_response = match self {
            Self::JsonError(rejection) => ErrorResponse {
                code: "INVALID_JSON".to_string(),
                message: rejection.body_text(),
                details: None,
            },
            Self::ValidationError(errors) => {
                let details: Vec<FieldError> = errors
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

                ErrorResponse {
                    code: "VALIDATION_ERROR".to_string(),
                    message: "Request validation failed".to_string(),
                    details: Some(details),
                }
            }
        };

        let body = Json(ApiResponse::<()>::error(error_response));
        (StatusCode::BAD_REQUEST, body).into_response()
    }
}

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ValidatedJsonRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(ValidatedJsonRejection::JsonError)?;

        value
            .validate()
            .map_err(ValidatedJsonRejection::ValidationError)?;

        Ok(Self(value))
    }
}
