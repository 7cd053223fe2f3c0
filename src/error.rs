use axum::{Json, http::StatusCode, response::IntoResponse};
use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, state::InvalidTransition};

/// Field-level validation messages keyed by input field name.
pub type FieldErrors = IndexMap<String, Vec<String>>;

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Invalid input provided by the client.
    #[error("{message}")]
    Validation {
        /// Human-readable summary of what was rejected.
        message: String,
        /// Per-field messages, empty when the failure is not tied to a field.
        fields: FieldErrors,
    },
    /// Another poll already occupies the active slot.
    #[error("{0}")]
    Conflict(String),
    /// The poll is not accepting this operation in its current status.
    #[error("{0}")]
    NotActive(String),
    /// The voter has already cast a vote in this poll.
    #[error("{0}")]
    DuplicateVote(String),
    /// Caller is not allowed to perform the operation.
    #[error("{0}")]
    Unauthorized(String),
    /// Requested resource was not found.
    #[error("{0}")]
    NotFound(String),
}

impl ServiceError {
    /// Build a validation error that is not tied to a specific field.
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation {
            message: message.into(),
            fields: FieldErrors::new(),
        }
    }

    /// Build a validation error carrying messages for one field.
    pub fn field_validation(
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        let mut fields = FieldErrors::new();
        fields.insert(field.into(), vec![message.clone()]);
        ServiceError::Validation { message, fields }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();
        for (field, errors) in err.field_errors() {
            let messages = errors
                .iter()
                .map(|error| {
                    error
                        .message
                        .clone()
                        .map(|message| message.into_owned())
                        .unwrap_or_else(|| error.code.to_string())
                })
                .collect();
            fields.insert(field.to_string(), messages);
        }

        ServiceError::Validation {
            message: "validation failed".into(),
            fields,
        }
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::NotActive(err.to_string())
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("{0}")]
    BadRequest(String, FieldErrors),
    /// Unauthorized access attempt.
    #[error("{0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("{0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Validation { message, fields } => AppError::BadRequest(message, fields),
            ServiceError::Conflict(message) => AppError::Conflict(message),
            ServiceError::NotActive(message) => AppError::Conflict(message),
            ServiceError::DuplicateVote(message) => AppError::Conflict(message),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
        }
    }
}

/// JSON body returned for every failed request.
#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<FieldErrors>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(..) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = self.to_string();
        let errors = match self {
            AppError::BadRequest(_, fields) if !fields.is_empty() => Some(fields),
            _ => None,
        };

        let payload = Json(ErrorBody {
            success: false,
            message,
            errors,
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_validation_carries_the_field() {
        let err = ServiceError::field_validation("name", "Poll name must be at least 3 characters.");
        match err {
            ServiceError::Validation { message, fields } => {
                assert_eq!(message, "Poll name must be at least 3 characters.");
                assert_eq!(
                    fields.get("name").map(Vec::as_slice),
                    Some(
                        &["Poll name must be at least 3 characters.".to_owned()][..]
                    )
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn service_errors_map_to_http_statuses() {
        let cases = [
            (ServiceError::validation("bad"), StatusCode::BAD_REQUEST),
            (
                ServiceError::Conflict("busy".into()),
                StatusCode::CONFLICT,
            ),
            (
                ServiceError::NotActive("closed".into()),
                StatusCode::CONFLICT,
            ),
            (
                ServiceError::DuplicateVote("again".into()),
                StatusCode::CONFLICT,
            ),
            (
                ServiceError::Unauthorized("not yours".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ServiceError::NotFound("gone".into()),
                StatusCode::NOT_FOUND,
            ),
            (ServiceError::Degraded, StatusCode::SERVICE_UNAVAILABLE),
        ];

        for (err, expected) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
