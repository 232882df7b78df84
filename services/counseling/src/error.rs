//! Custom error types for the counseling service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::error::{CacheError, DatabaseError};
use thiserror::Error;
use tracing::error;

use crate::models::ApiResponse;

/// Custom error type for the counseling service
#[derive(Error, Debug)]
pub enum ApiError {
    /// A required field is missing or out of range
    #[error("{0}")]
    Validation(String),

    /// The addressed entity does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// The event is not allowed from the entity's current status
    #[error("Cannot {event} while status is {from}")]
    InvalidStateTransition {
        from: &'static str,
        event: &'static str,
    },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Cache error
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            ApiError::Database(_) | ApiError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match &self {
            ApiError::Database(e) => {
                error!("Database failure: {}", e);
                "Database error, please retry".to_string()
            }
            ApiError::Cache(e) => {
                error!("Cache failure: {}", e);
                "Cache error, please retry".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ApiResponse::failure(message))).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("Mapping".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::InvalidStateTransition {
                from: "PENDING",
                event: "reject"
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Database(DatabaseError::Migration("checksum mismatch".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            ApiError::InvalidStateTransition {
                from: "PENDING",
                event: "reject"
            }
            .to_string(),
            "Cannot reject while status is PENDING"
        );
        assert_eq!(
            ApiError::NotFound("Extension request".into()).to_string(),
            "Extension request not found"
        );
    }
}
