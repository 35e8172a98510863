//! HTTP error responses
//!
//! Every failure is rendered as `{"error": "<message>"}` with a status code
//! derived from the error kind.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::QuotaError;

/// Error returned by route handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or malformed bearer credential
    #[error("invalid or missing authorization token")]
    Unauthorized,

    /// Body or query could not be parsed
    #[error("{0}")]
    BadRequest(String),

    /// Failure from the quota core
    #[error(transparent)]
    Quota(#[from] QuotaError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Quota(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Quota(e) if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Quota(QuotaError::StoreRejected { .. }) => StatusCode::BAD_GATEWAY,
            ApiError::Quota(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
