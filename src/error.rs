//! Error types for shift-relay operations.
//!
//! Defines error types for the major subsystems:
//! - Shift validation
//! - Scheduling API interactions
//! - Completion notifications
//! - Request orchestration
//!
//! Storage errors live next to the storage code in [`crate::storage`].

use thiserror::Error;
use uuid::Uuid;

use crate::storage::DatabaseError;

/// Errors raised when a submitted shift is malformed.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field '{0}'")]
    MissingField(String),

    #[error("Shift ends at '{end}' which is not after its start '{start}'")]
    InvalidTimeRange { start: String, end: String },

    #[error("Shift #{index} is invalid: {source}")]
    InBatch {
        index: usize,
        #[source]
        source: Box<ValidationError>,
    },
}

/// Errors that can occur while talking to the scheduling API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Scheduling API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Failed to parse scheduling API response: {0}")]
    ParseError(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            UpstreamError::ParseError(err.to_string())
        } else {
            UpstreamError::RequestFailed(err.to_string())
        }
    }
}

/// Errors that can occur while publishing a completion notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Redis connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced by the request service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Request {0} not found")]
    RequestNotFound(Uuid),

    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::MissingField("userId".to_string());
        assert!(err.to_string().contains("userId"));

        let err = ValidationError::InBatch {
            index: 3,
            source: Box::new(ValidationError::MissingField("endTime".to_string())),
        };
        let text = err.to_string();
        assert!(text.contains("#3"));
        assert!(text.contains("endTime"));
    }

    #[test]
    fn test_upstream_error_display() {
        let err = UpstreamError::ApiError {
            code: 503,
            message: "unavailable".to_string(),
        };
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("unavailable"));
    }

    #[test]
    fn test_service_error_from_validation() {
        let err: ServiceError = ValidationError::MissingField("companyId".to_string()).into();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn test_request_not_found_display() {
        let id = Uuid::new_v4();
        let err = ServiceError::RequestNotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }
}
