use crate::api::ApiResponse;
use crate::review_service::ReviewError;
use crate::sm2_scheduler::SchedulerError;
use crate::validation::{ReviewInputError, ValidationError};
use axum::{http::StatusCode, response::Json};
use tracing::{error, info, warn};

/// Centralized error types for consistent API error handling
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] anyhow::Error),

    #[error("Resource already exists: {0}")]
    DuplicateResource(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Error context for structured logging
#[derive(Debug)]
pub struct ErrorContext {
    pub operation: String,
    pub resource_id: Option<String>,
    pub resource_type: String,
    pub user_friendly_message: Option<String>,
}

impl ErrorContext {
    pub fn new(operation: &str, resource_type: &str) -> Self {
        Self {
            operation: operation.to_string(),
            resource_id: None,
            resource_type: resource_type.to_string(),
            user_friendly_message: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn with_user_message(mut self, message: &str) -> Self {
        self.user_friendly_message = Some(message.to_string());
        self
    }
}

pub type ErrorResponse = (StatusCode, Json<ApiResponse<()>>);

impl ApiError {
    /// Convert API error to HTTP response with consistent structure and logging
    pub fn to_response_with_context(self, context: ErrorContext) -> ErrorResponse {
        match &self {
            ApiError::NotFound(_) => {
                info!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Resource not found"
                );
                (
                    StatusCode::NOT_FOUND,
                    Json(ApiResponse::error(
                        context
                            .user_friendly_message
                            .unwrap_or_else(|| format!("{} not found", context.resource_type)),
                    )),
                )
            }
            ApiError::ValidationError(_) | ApiError::BadRequest(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Rejected request"
                );
                (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error(self.to_string())),
                )
            }
            ApiError::DuplicateResource(_) | ApiError::Conflict(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Conflicting write"
                );
                (
                    StatusCode::CONFLICT,
                    Json(ApiResponse::error(self.to_string())),
                )
            }
            ApiError::DatabaseError(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Database error"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error(
                        "Database operation failed. Please try again.".to_string(),
                    )),
                )
            }
        }
    }

    /// Simple conversion without context
    pub fn to_response(self) -> ErrorResponse {
        let context = ErrorContext::new("unknown", "resource");
        self.to_response_with_context(context)
    }
}

/// Helper macro for structured error responses
#[macro_export]
macro_rules! api_error {
    (not_found, $operation:expr, $resource_type:expr, $id:expr) => {
        $crate::errors::ApiError::NotFound(format!("{} with id '{}' not found", $resource_type, $id))
            .to_response_with_context(
                $crate::errors::ErrorContext::new($operation, $resource_type).with_id($id),
            )
    };

    (classify, $operation:expr, $resource_type:expr, $id:expr, $error:expr) => {
        $crate::errors::classify_error(&$error).to_response_with_context(
            $crate::errors::ErrorContext::new($operation, $resource_type).with_id($id),
        )
    };
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(anyhow::Error::from(err))
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

/// Map a service error onto the API taxonomy. Typed errors are recovered by
/// downcast; anything else falls back to message matching.
pub fn classify_error(error: &anyhow::Error) -> ApiError {
    if let Some(err) = error.downcast_ref::<SchedulerError>() {
        return err.clone().into();
    }
    if let Some(err) = error.downcast_ref::<ValidationError>() {
        return err.clone().into();
    }
    if let Some(err) = error.downcast_ref::<ReviewInputError>() {
        return ApiError::ValidationError(err.to_string());
    }
    if let Some(err) = error.downcast_ref::<ReviewError>() {
        return match err {
            ReviewError::Suspended { .. } => ApiError::BadRequest(err.to_string()),
            ReviewError::Conflict { .. } => ApiError::Conflict(err.to_string()),
        };
    }
    classify_database_error(error)
}

/// Helper function to detect error types from anyhow error messages
pub fn classify_database_error(error: &anyhow::Error) -> ApiError {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("already exists") || error_str.contains("unique constraint") {
        ApiError::DuplicateResource("Resource already exists".to_string())
    } else if error_str.contains("foreign key constraint") {
        ApiError::NotFound("Referenced resource not found".to_string())
    } else if error_str.contains("no rows") {
        ApiError::NotFound("Resource not found".to_string())
    } else if error_str.contains("cannot be null") || error_str.contains("not null constraint") {
        ApiError::ValidationError("Required field is missing or invalid".to_string())
    } else {
        ApiError::DatabaseError(anyhow::anyhow!("{}", error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_context_creation() {
        let context = ErrorContext::new("submit_review", "flashcard")
            .with_id("123")
            .with_user_message("Custom message");

        assert_eq!(context.operation, "submit_review");
        assert_eq!(context.resource_type, "flashcard");
        assert_eq!(context.resource_id, Some("123".to_string()));
        assert_eq!(
            context.user_friendly_message,
            Some("Custom message".to_string())
        );
    }

    #[test]
    fn test_typed_errors_are_recovered() {
        let err = anyhow::Error::new(SchedulerError::InvalidQuality(7));
        assert!(matches!(classify_error(&err), ApiError::ValidationError(_)));

        let err = anyhow::Error::new(ValidationError::new("front", "is required"));
        assert!(matches!(classify_error(&err), ApiError::ValidationError(_)));

        let err = anyhow::Error::new(ReviewError::Conflict {
            flashcard_id: Uuid::new_v4(),
            attempts: 3,
        });
        assert!(matches!(classify_error(&err), ApiError::Conflict(_)));

        let err = anyhow::Error::new(ReviewError::Suspended {
            flashcard_id: Uuid::new_v4(),
        });
        assert!(matches!(classify_error(&err), ApiError::BadRequest(_)));
    }

    #[test]
    fn test_review_input_errors_are_validation_errors() {
        let err = anyhow::Error::new(ReviewInputError::from(ValidationError::new(
            "response_time_ms",
            "-5ms cannot be negative",
        )));
        let (status, body) = classify_error(&err).to_response();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.0.error.unwrap().contains("response_time_ms"));

        let err = anyhow::Error::new(ReviewInputError::from(SchedulerError::InvalidQuality(9)));
        assert!(matches!(classify_error(&err), ApiError::ValidationError(_)));
    }

    #[test]
    fn test_not_found_uses_user_message() {
        let context = ErrorContext::new("submit_review", "flashcard")
            .with_user_message("Flashcard not found or inactive");
        let (status, body) =
            ApiError::NotFound("missing".to_string()).to_response_with_context(context);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.0.error.as_deref(), Some("Flashcard not found or inactive"));
    }

    #[test]
    fn test_context_wrapped_errors_are_recovered() {
        let err = anyhow::Error::new(SchedulerError::InvalidState("bad".to_string()))
            .context("while reviewing");
        assert!(matches!(classify_error(&err), ApiError::ValidationError(_)));
    }

    #[test]
    fn test_database_error_classification() {
        let duplicate_error = anyhow::anyhow!("UNIQUE constraint failed: flashcards.id");
        assert!(matches!(
            classify_database_error(&duplicate_error),
            ApiError::DuplicateResource(_)
        ));

        let not_found_error = anyhow::anyhow!("no rows returned by a query");
        assert!(matches!(
            classify_database_error(&not_found_error),
            ApiError::NotFound(_)
        ));

        let other = anyhow::anyhow!("disk I/O error");
        assert!(matches!(
            classify_database_error(&other),
            ApiError::DatabaseError(_)
        ));
    }

    #[test]
    fn test_api_error_responses() {
        let error = ApiError::NotFound("Flashcard not found".to_string());
        let context = ErrorContext::new("get_flashcard", "flashcard").with_id("123");
        let (status, _response) = error.to_response_with_context(context);
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = ApiError::ValidationError("Invalid data".to_string()).to_response();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = ApiError::Conflict("lost race".to_string()).to_response();
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = ApiError::DatabaseError(anyhow::anyhow!("boom")).to_response();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
