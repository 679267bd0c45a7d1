//! Error Types for taskdesk API
//!
//! This module defines error handling for the API layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//!
//! All errors are serialized as JSON with appropriate HTTP status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use taskdesk_core::{ConfigError, StorageError, TaskdeskError};

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401, 403)
    // ========================================================================
    /// Request lacks valid authentication credentials
    Unauthorized,

    /// Caller lacks the capability an action requires
    Forbidden,

    /// Credential header is present but malformed
    InvalidToken,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// One or more actions failed validation
    ValidationFailed,

    /// Request contains invalid input data
    InvalidInput,

    /// Field format is incorrect
    InvalidFormat,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested entity does not exist
    EntityNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// Idempotency key was already used with a different request
    IdempotencyConflict,

    // ========================================================================
    // Server Errors (500)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Database operation failed
    DatabaseError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized | ErrorCode::InvalidToken => StatusCode::UNAUTHORIZED,

            ErrorCode::Forbidden => StatusCode::FORBIDDEN,

            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::InvalidFormat => StatusCode::BAD_REQUEST,

            ErrorCode::EntityNotFound => StatusCode::NOT_FOUND,

            ErrorCode::IdempotencyConflict => StatusCode::CONFLICT,

            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::Forbidden => "Access forbidden",
            ErrorCode::InvalidToken => "Invalid authentication token",
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::EntityNotFound => "Entity not found",
            ErrorCode::IdempotencyConflict => {
                "Idempotency key was already used with a different request"
            }
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// FIELD ERRORS
// ============================================================================

/// One field-level violation inside a batch.
///
/// `index` is the position of the offending action, or `None` for
/// violations of the request envelope itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub index: Option<usize>,
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(index: Option<usize>, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            index,
            field: field.into(),
            message: message.into(),
        }
    }

    /// Violation attributed to the action at `index`.
    pub fn at(index: usize, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Some(index), field, message)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (field errors, missing capability, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Create a Forbidden error naming the capability that was missing.
    pub fn missing_capability(index: usize, action_type: &str, capability: &str) -> Self {
        Self::new(
            ErrorCode::Forbidden,
            format!(
                "Action {} ({}) requires capability '{}'",
                index, action_type, capability
            ),
        )
        .with_details(serde_json::json!({
            "index": index,
            "type": action_type,
            "missing_capability": capability,
        }))
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToken, message)
    }

    /// Create a ValidationFailed error carrying every field violation.
    pub fn validation_errors(errors: Vec<FieldError>) -> Self {
        let message = match errors.len() {
            1 => "1 validation error".to_string(),
            n => format!("{} validation errors", n),
        };
        Self::new(ErrorCode::ValidationFailed, message)
            .with_details(serde_json::json!({ "errors": errors }))
    }

    /// Create a ValidationFailed error for a single field.
    pub fn validation_failed(field_error: FieldError) -> Self {
        Self::validation_errors(vec![field_error])
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Field '{}' has invalid format, expected {}", field, expected),
        )
    }

    pub fn entity_not_found(entity_type: &str, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::EntityNotFound,
            format!("{} with id {} not found", entity_type, id),
        )
    }

    pub fn idempotency_conflict(key: &str) -> Self {
        Self::new(
            ErrorCode::IdempotencyConflict,
            format!(
                "Idempotency key '{}' was already used with a different request",
                key
            ),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Failure to serialize a server-side value. Never the caller's fault.
    pub fn serialization(what: &str, err: serde_json::Error) -> Self {
        tracing::error!(error = %err, "Failed to serialize {}", what);
        Self::internal_error(format!("Failed to serialize {}", what))
    }

    /// Whether this error is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::NotFound { entity_type, id } => {
                ApiError::entity_not_found(entity_type.as_str(), id)
            }
            StorageError::ConstraintViolation { constraint, .. } => {
                tracing::error!(error = %err, "Storage constraint violated");
                ApiError::database_error(format!("Database constraint violated: {}", constraint))
            }
            StorageError::Unavailable { .. } => {
                tracing::error!(error = %err, "Storage unavailable");
                ApiError::database_error("Storage backend unavailable")
            }
            StorageError::SerializationConflict { .. } => {
                tracing::warn!(error = %err, "Transaction lost a serialization conflict");
                ApiError::database_error("Batch conflicted with a concurrent request")
            }
            _ => {
                tracing::error!(error = %err, "Storage error");
                ApiError::database_error("Database operation failed")
            }
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::invalid_input(err.to_string())
    }
}

impl From<TaskdeskError> for ApiError {
    fn from(err: TaskdeskError) -> Self {
        match err {
            TaskdeskError::Storage(e) => e.into(),
            TaskdeskError::Config(e) => e.into(),
        }
    }
}

/// Convert from tokio_postgres::Error to ApiError.
impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        // Full error goes to the log; callers get a generic message
        tracing::error!("Database error: {:?}", err);
        ApiError::database_error("Database operation failed")
    }
}

/// Convert from deadpool_postgres::PoolError to ApiError.
impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!("Connection pool error: {:?}", err);
        ApiError::database_error("Failed to acquire database connection")
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use taskdesk_core::EntityType;
    use uuid::Uuid;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::ValidationFailed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::EntityNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::IdempotencyConflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::DatabaseError.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_validation_errors_carry_every_field() {
        let err = ApiError::validation_errors(vec![
            FieldError::at(0, "data.title", "title is required"),
            FieldError::at(3, "saveAs", "saveAs is not allowed on task.update"),
        ]);
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert_eq!(err.message, "2 validation errors");
        let errors = err
            .details
            .as_ref()
            .and_then(|d| d.get("errors"))
            .and_then(|e| e.as_array())
            .map(|e| e.len());
        assert_eq!(errors, Some(2));
    }

    #[test]
    fn test_missing_capability_details() {
        let err = ApiError::missing_capability(2, "doc.create", "docs:write");
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        let details = err.details.unwrap_or_default();
        assert_eq!(details["missing_capability"], "docs:write");
        assert_eq!(details["index"], 2);
    }

    #[test]
    fn test_storage_not_found_maps_to_404() {
        let err: ApiError = StorageError::NotFound {
            entity_type: EntityType::Task,
            id: Uuid::nil(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::EntityNotFound);
        assert!(err.message.contains("task"));
    }

    #[test]
    fn test_storage_failure_hides_backend_text() {
        let err: ApiError = StorageError::TransactionFailed {
            reason: "could not serialize access due to concurrent update".to_string(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(!err.message.contains("serialize"));
    }

    #[test]
    fn test_backend_outages_are_server_errors() {
        let unavailable: ApiError = StorageError::Unavailable {
            reason: "connection refused".to_string(),
        }
        .into();
        assert_eq!(unavailable.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!unavailable.message.contains("refused"));

        let closed: ApiError = deadpool_postgres::PoolError::Closed.into();
        assert_eq!(closed.code, ErrorCode::DatabaseError);
        assert_eq!(closed.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_serialization_failure_is_internal() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let api = ApiError::serialization("audit result", err);
        assert_eq!(api.code, ErrorCode::InternalError);
        assert_eq!(api.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!api.is_client_error());
        assert!(api.message.contains("audit result"));
    }

    #[test]
    fn test_error_serialization() -> Result<(), serde_json::Error> {
        let err = ApiError::unauthorized("Invalid token");
        let json = serde_json::to_string(&err)?;
        assert!(json.contains("UNAUTHORIZED"));
        assert!(!json.contains("details"));

        let deserialized: ApiError = serde_json::from_str(&json)?;
        assert_eq!(deserialized, err);
        Ok(())
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::idempotency_conflict("k-1");
        let display = format!("{}", err);
        assert!(display.contains("IdempotencyConflict"));
        assert!(display.contains("k-1"));
    }
}
