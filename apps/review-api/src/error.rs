//! Error types for the review API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::gateway::GatewayError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid text content: {0}")]
    InvalidText(String),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Assessment not found: {0}")]
    AssessmentNotFound(i64),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::InvalidText(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Invalid text content: {}", msg),
            ),
            ApiError::InvalidApiKey => {
                (StatusCode::UNAUTHORIZED, "Invalid API key".to_string())
            }
            ApiError::AssessmentNotFound(id) => (
                StatusCode::NOT_FOUND,
                format!("Assessment not found: {}", id),
            ),
            ApiError::Gateway(e) => {
                tracing::error!("Analysis gateway error: {}", e);
                (e.status_code(), format!("Text analysis failed: {}", e))
            }
            ApiError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
