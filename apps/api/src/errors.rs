use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;
use crate::voice::VoiceError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Valid session in its terminal state; rejected without mutation.
    #[error("This interview session is already completed")]
    AlreadyCompleted,

    #[error("Interview session does not exist or has expired")]
    SessionNotFound,

    /// TTL eviction — the expected end of a session's life, not an outage.
    #[error("Interview session has expired or does not exist. Please start a new session.")]
    SessionExpired,

    /// Question generation failed where no fallback exists (start path).
    #[error("Could not get question from API: {0}")]
    Generator(String),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("Voice error: {0}")]
    Voice(#[from] VoiceError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::UnsupportedMediaType(msg) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "UNSUPPORTED_MEDIA_TYPE",
                msg.clone(),
            ),
            AppError::AlreadyCompleted => (
                StatusCode::BAD_REQUEST,
                "ALREADY_COMPLETED",
                self.to_string(),
            ),
            AppError::SessionNotFound => {
                (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND", self.to_string())
            }
            AppError::SessionExpired => (StatusCode::GONE, "SESSION_EXPIRED", self.to_string()),
            AppError::Generator(msg) => {
                tracing::error!("Question generation error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "GENERATOR_ERROR",
                    "Could not get question from API. Please try again later.".to_string(),
                )
            }
            AppError::Store(e) => {
                tracing::error!("Session store error: {e}");
                match e {
                    StoreError::Unavailable { .. } => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "SERVICE_UNAVAILABLE",
                        "Database service is currently unavailable. Please try again later."
                            .to_string(),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "STORE_ERROR",
                        "A storage error occurred".to_string(),
                    ),
                }
            }
            AppError::Voice(e) => match e {
                VoiceError::NotConfigured => (
                    StatusCode::NOT_IMPLEMENTED,
                    "API_NOT_CONFIGURED",
                    "The voice feature is not configured".to_string(),
                ),
                VoiceError::Api { status, message } => {
                    tracing::error!("Voice provider error (status {status}): {message}");
                    (
                        StatusCode::BAD_GATEWAY,
                        "API_ERROR",
                        format!("Voice API error: {message}"),
                    )
                }
                VoiceError::Http(e) => {
                    tracing::error!("Voice transport error: {e}");
                    (
                        StatusCode::BAD_GATEWAY,
                        "API_ERROR",
                        "Voice provider is unreachable".to_string(),
                    )
                }
            },
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "message": message,
            "error_code": code
        }));

        (status, body).into_response()
    }
}
