use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::Error;

/// Errors returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Vault(#[from] Error),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// HTTP status for a vault error.
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidName(_) => StatusCode::BAD_REQUEST,
        Error::MalformedEnvelope { .. } | Error::Decryption => StatusCode::UNPROCESSABLE_ENTITY,
        Error::EntropyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Configuration(_) | Error::Encryption(_) | Error::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Vault(e) => status_for(e),
            ApiError::BadRequest(_) | ApiError::Multipart(_) => StatusCode::BAD_REQUEST,
            ApiError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }

        // Internal details stay in the log
        let msg = match &self {
            ApiError::Vault(Error::Io(_)) | ApiError::Task(_) => "Unexpected error".to_string(),
            ApiError::Vault(Error::Configuration(_)) => "Encryption key not found".to_string(),
            other => other.to_string(),
        };

        (status, Json(serde_json::json!({ "msg": msg }))).into_response()
    }
}
