use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::warn;
use vibe_common::VibeError;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest {
        message: String,
        /// Valid values to show the caller, e.g. the configured categories.
        available: Option<Vec<String>>,
    },

    #[error(transparent)]
    Vibe(#[from] VibeError),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            available: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Vibe(VibeError::PostNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Vibe(VibeError::ExternalServiceUnavailable { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Vibe(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::BadRequest {
                message,
                available: Some(available),
            } => json!({ "error": message, "available": available }),
            ApiError::Vibe(e) if status.is_server_error() => {
                warn!(error = %e, status = status.as_u16(), "api.request.failed");
                json!({ "error": status.canonical_reason().unwrap_or("internal error") })
            }
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
