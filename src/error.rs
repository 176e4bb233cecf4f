//! Error types for the Amnesia spread service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::oracle::OracleError;
use crate::split::{SplitError, TrainError};

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Image error: {0}")]
    Split(#[from] SplitError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Training error: {0}")]
    Train(#[from] TrainError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Structured data about the failure (e.g. example counts)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Split(SplitError::Fetch(_)) => StatusCode::BAD_GATEWAY,
            AppError::Split(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Oracle(e) => e.status_code(),
            AppError::Train(TrainError::InsufficientData { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Internal(_) | AppError::Database(_) | AppError::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut data = None;

        let (error_type, message) = match &self {
            AppError::NotFound(msg) => ("not_found", msg.clone()),
            AppError::BadRequest(msg) => ("bad_request", msg.clone()),
            AppError::Conflict(msg) => ("conflict", msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("internal_error", "An internal error occurred".to_string())
            }
            AppError::Split(e) => {
                tracing::warn!("Image error: {}", e);
                match e {
                    SplitError::Fetch(_) => ("fetch_error", e.to_string()),
                    _ => ("invalid_image", e.to_string()),
                }
            }
            AppError::Oracle(e) => {
                tracing::error!("Oracle error: {}", e);
                let error_type = match e {
                    OracleError::RateLimited { .. } => "rate_limited",
                    OracleError::Timeout(_) => "oracle_timeout",
                    OracleError::MalformedResponse(_) => "malformed_oracle_response",
                    OracleError::InvalidImage(_) => "invalid_image",
                    OracleError::ProviderNotAvailable(_) => "oracle_unavailable",
                    OracleError::ApiError(_) => "oracle_error",
                };
                (error_type, e.to_string())
            }
            AppError::Train(e) => {
                let TrainError::InsufficientData { valid, total } = e;
                data = Some(serde_json::json!({ "valid": valid, "total": total }));
                ("insufficient_data", e.to_string())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                ("database_error", "Database error".to_string())
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                ("serialization_error", "Failed to serialize data".to_string())
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
            data,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::from(SplitError::Decode("bad".into())).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::from(TrainError::InsufficientData { valid: 3, total: 5 }).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::from(OracleError::RateLimited {
                key_index: Some(0),
                message: "slow down".into()
            })
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[tokio::test]
    async fn test_insufficient_data_body_has_counts() {
        let response = AppError::from(TrainError::InsufficientData { valid: 7, total: 12 }).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "insufficient_data");
        assert_eq!(body["data"]["valid"], 7);
        assert_eq!(body["data"]["total"], 12);
    }
}
