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
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::RoomNotFound(_)
            | AppError::InvalidInput(_)
            | AppError::Protocol(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Storage(_) | AppError::Transport(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "AUTH_001",
            AppError::RoomNotFound(_) => "ROOM_001",
            AppError::RateLimited => "RATE_001",
            AppError::InvalidInput(_) => "VAL_001",
            AppError::Storage(_) => "IO_001",
            AppError::Protocol(_) => "PROTO_001",
            AppError::Transport(_) => "TRANSPORT_001",
            AppError::Internal(_) => "INT_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::Unauthorized(_) => "Unauthorized".to_string(),
            AppError::RoomNotFound(_) => "Room doesn't exist".to_string(),
            AppError::RateLimited => "Too Many Requests".to_string(),
            AppError::InvalidInput(_) => "Invalid input provided".to_string(),
            AppError::Storage(_) => "Storage error".to_string(),
            AppError::Protocol(_) => "Invalid message format".to_string(),
            AppError::Transport(_) | AppError::Internal(_) => {
                "An internal server error occurred".to_string()
            },
        }
    }

    /// True for errors caused by the filesystem entry being absent.
    pub fn is_not_found_io(&self) -> bool {
        matches!(self, AppError::Storage(e) if e.kind() == std::io::ErrorKind::NotFound)
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_app_error_display() {
        let err = AppError::Unauthorized("10.0.0.9".to_string());
        assert_eq!(err.to_string(), "Unauthorized: 10.0.0.9");

        let io_error = AppError::Storage(IoError::new(ErrorKind::PermissionDenied, "denied"));
        assert!(io_error.to_string().contains("Storage error"));

        assert_eq!(AppError::RateLimited.to_string(), "Rate limit exceeded");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::RoomNotFound("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::RateLimited.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::Storage(IoError::other("disk")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let json_err: serde_json::Error =
            serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        assert_eq!(AppError::Protocol(json_err).status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_app_error_error_codes() {
        assert_eq!(AppError::Unauthorized("x".into()).error_code(), "AUTH_001");
        assert_eq!(AppError::RateLimited.error_code(), "RATE_001");
        assert_eq!(AppError::Transport("x".into()).error_code(), "TRANSPORT_001");
    }

    #[test]
    fn test_not_found_io_detection() {
        let missing = AppError::Storage(IoError::new(ErrorKind::NotFound, "gone"));
        assert!(missing.is_not_found_io());

        let denied = AppError::Storage(IoError::new(ErrorKind::PermissionDenied, "no"));
        assert!(!denied.is_not_found_io());
        assert!(!AppError::RateLimited.is_not_found_io());
    }

    #[test]
    fn test_error_from_impls() {
        let app_err: AppError = IoError::new(ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(app_err, AppError::Storage(_)));

        let json_err: serde_json::Error =
            serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let app_err: AppError = json_err.into();
        assert!(matches!(app_err, AppError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_error_into_response() {
        let response = AppError::RateLimited.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .contains("application/json"));
    }
}
