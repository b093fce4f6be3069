use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("Failed to persist transaction: {0:#}")]
    Store(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Details go to the log, clients get a generic message.
        let (status, error_message) = match &self {
            ApiError::InvalidPayload(_) => {
                tracing::warn!("{self}");
                (StatusCode::BAD_REQUEST, "Bad request")
            }
            ApiError::Store(_) => {
                tracing::error!("{self}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
