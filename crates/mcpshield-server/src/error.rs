//! API error types for the mcpshield server.
//!
//! Maps core domain errors to HTTP status codes and JSON error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use mcpshield_core::error::PolicyStoreError;

/// API error type for route handlers.
pub enum ApiError {
    /// The policy store could not serve the synchronous fetch.
    PolicyStore(PolicyStoreError),
    /// Bad request (malformed body, etc.).
    BadRequest(String),
}

impl From<PolicyStoreError> for ApiError {
    fn from(err: PolicyStoreError) -> Self {
        Self::PolicyStore(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::PolicyStore(e) => {
                tracing::error!("policy store error: {e}");
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = axum::Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
