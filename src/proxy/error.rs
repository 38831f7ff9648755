//! Route error types and response handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::upstream::UpstreamError;

/// Errors returned by the chat routes before streaming starts
#[derive(Debug)]
pub(crate) enum ApiError {
    /// Malformed body or missing prompt
    BadRequest(String),
    /// Provider credential not configured
    MissingCredential { key_env: String },
    /// Provider failed; `status` is the provider's HTTP status when it sent one
    Upstream { status: Option<u16>, message: String },
}

impl From<UpstreamError> for ApiError {
    fn from(e: UpstreamError) -> Self {
        match e {
            UpstreamError::MissingCredential { key_env } => ApiError::MissingCredential { key_env },
            UpstreamError::Status { status, message } => ApiError::Upstream {
                status: Some(status),
                message,
            },
            other => ApiError::Upstream {
                status: None,
                message: other.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => {
                tracing::debug!("Rejected request: {}", msg);
                (StatusCode::BAD_REQUEST, json!({ "error": msg }))
            }
            ApiError::MissingCredential { key_env } => {
                tracing::error!("Missing credential: {} is not set", key_env);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": format!("Server is missing its API key ({})", key_env) }),
                )
            }
            ApiError::Upstream { status, message } => {
                tracing::error!(status = ?status, "Upstream error: {}", message);
                let mut body = json!({ "error": message });
                if let Some(status) = status {
                    body["status"] = status.into();
                }
                (StatusCode::INTERNAL_SERVER_ERROR, body)
            }
        };

        (status, Json(body)).into_response()
    }
}
