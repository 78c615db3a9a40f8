//! Handler-boundary error conversion.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tally_core::error::TallyError;

/// Any failure that reaches a handler. Always rendered as a JSON 500.
#[derive(Debug)]
pub struct ApiError(pub TallyError);

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Stable client-facing code, e.g. `"database error"`.
    pub error: &'static str,
    /// Human-readable cause.
    pub detail: String,
}

impl From<TallyError> for ApiError {
    fn from(err: TallyError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self.0, "request failed");
        let body = ErrorBody {
            error: self.0.client_code().as_str(),
            detail: self.0.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
