use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::models::{ItemId, UserId};

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Invalid score {score}: must be between {min} and {max}")]
    InvalidScore { score: f64, min: f64, max: f64 },

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Movie not found: {0}")]
    ItemNotFound(ItemId),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Retrain failed: {0}")]
    RetrainFailure(String),

    #[error("Retrain exceeded {0:?}")]
    RetrainTimeout(Duration),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidScore { .. } | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::UserNotFound(_) | AppError::ItemNotFound(_) => StatusCode::NOT_FOUND,
            AppError::RetrainFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::RetrainTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Database(_) | AppError::Cache(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %self, status = %status, "Request failed");
        }

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
