use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::error::ProcessingError;

/// Failures surfaced by the JSON API, rendered as `{"error": "..."}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Processing(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::BadRequest(message) => warn!(%message, "rejected API request"),
            ApiError::Processing(e) => error!(kind = e.kind(), error = %e, "processing failed"),
            ApiError::Internal(message) => error!(%message, "internal error"),
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
