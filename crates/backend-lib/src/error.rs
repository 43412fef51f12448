// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Room does not exist")]
    RoomNotFound,

    #[error("Room is locked and not accepting new members")]
    RoomLocked,

    #[error("Authentication error: {0}")]
    Unauthorized(String),

    #[error("Room is not accessible to user")]
    NotMember,

    #[error("Only the room owner can do this")]
    NotOwner,

    #[error("Processing of music is already in progress")]
    ProcessingInProgress,

    #[error("Processing of music has not been done")]
    ProcessingNotStarted,

    #[error("Processing of music failed")]
    ProcessingFailed,

    #[error("Collecting a member library failed: {0}")]
    UpstreamCollectionFailed(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotMember | AppError::NotOwner => StatusCode::FORBIDDEN,
            AppError::RoomNotFound => StatusCode::NOT_FOUND,
            AppError::RoomLocked | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::ProcessingInProgress
            | AppError::ProcessingNotStarted
            | AppError::ProcessingFailed => StatusCode::CONFLICT,
            AppError::UpstreamCollectionFailed(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::RoomNotFound => "ROOM_001",
            AppError::RoomLocked => "ROOM_002",
            AppError::Unauthorized(_) => "AUTH_001",
            AppError::NotMember => "AUTH_002",
            AppError::NotOwner => "AUTH_003",
            AppError::ProcessingInProgress => "PROC_001",
            AppError::ProcessingNotStarted => "PROC_002",
            AppError::ProcessingFailed => "PROC_003",
            AppError::UpstreamCollectionFailed(_) => "UPSTREAM_001",
            AppError::Persistence(_) => "STORE_001",
            AppError::Io(_) => "IO_001",
            AppError::Json(_) => "JSON_001",
            AppError::InvalidInput(_) => "VAL_001",
            AppError::Internal(_) => "INT_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::Unauthorized(_) => "You need to be logged in to perform this action".to_string(),
            AppError::UpstreamCollectionFailed(_) => {
                "The music provider could not be reached".to_string()
            },
            AppError::Persistence(_) | AppError::Io(_) | AppError::Json(_) => {
                "Internal server error".to_string()
            },
            AppError::Internal(_) => "An internal server error occurred".to_string(),
            AppError::InvalidInput(_) => "Invalid input provided".to_string(),
            // The remaining variants carry no internal detail
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}
