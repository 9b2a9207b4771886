//! Error handling for the Field Workforce Attendance Platform
//!
//! Service and handler code returns `AppError`; the HTTP layer translates it
//! into a `{ error: { code, message, field? } }` body with the mapped status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("No token provided")]
    NoToken,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // Authorization errors
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("No city access assigned")]
    NoCityAccess,

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {message}")]
    Conflict { resource: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Punch pipeline errors
    #[error("Invalid punch transition: {0}")]
    InvalidTransition(String),

    #[error("Face enrollment missing for employee {0}")]
    EnrollmentMissing(String),

    #[error("No face detected in image")]
    NoFaceDetected,

    #[error("No face matched above threshold")]
    NoFaceMatched,

    // External service errors
    #[error("Face service error: {0}")]
    FaceService(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Messaging gateway error: {0}")]
    Messaging(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// True when the underlying database error is a unique violation (23505)
    pub fn is_unique_violation(&self) -> bool {
        match self {
            AppError::DatabaseError(sqlx::Error::Database(db)) => {
                db.code().as_deref() == Some("23505")
            }
            _ => false,
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorDetail {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            AppError::NoToken => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("NO_TOKEN", "No token provided"),
            ),
            AppError::InvalidToken => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new("INVALID_TOKEN", "Invalid or expired token"),
            ),
            AppError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("UNAUTHORIZED", msg.clone()),
            ),
            AppError::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new("FORBIDDEN", msg.clone()),
            ),
            AppError::NoCityAccess => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new("NO_CITY_ACCESS", "No city access assigned"),
            ),
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "VALIDATION_ERROR".to_string(),
                    message: message.clone(),
                    field: Some(field.clone()),
                },
            ),
            AppError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", msg.clone()),
            ),
            AppError::Conflict { resource, message } => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    code: "CONFLICT".to_string(),
                    message: message.clone(),
                    field: Some(resource.clone()),
                },
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("NOT_FOUND", format!("{} not found", resource)),
            ),
            AppError::InvalidTransition(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("INVALID_TRANSITION", msg.clone()),
            ),
            AppError::EnrollmentMissing(emp) => (
                StatusCode::PRECONDITION_FAILED,
                ErrorDetail::new(
                    "FACE_ENROLLMENT_MISSING",
                    format!("Face enrollment missing for employee {}", emp),
                ),
            ),
            AppError::NoFaceDetected => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new("NO_FACE_DETECTED", "No face detected in image"),
            ),
            AppError::NoFaceMatched => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("NO_FACE_MATCHED", "No face matched above threshold"),
            ),
            AppError::FaceService(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("FACE_SERVICE_ERROR", format!("Face service error: {}", msg)),
            ),
            AppError::Storage(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new("STORAGE_ERROR", format!("Storage error: {}", msg)),
            ),
            AppError::Messaging(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new(
                    "MESSAGING_ERROR",
                    format!("Messaging gateway error: {}", msg),
                ),
            ),
            AppError::Configuration(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("CONFIGURATION_ERROR", format!("Configuration error: {}", msg)),
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("DATABASE_ERROR", "A database error occurred"),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", msg.clone()),
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", "An internal server error occurred"),
            ),
        };

        // Log the error for debugging
        tracing::error!("Error: {:?}", self);

        (status, Json(ErrorResponse { error: detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
