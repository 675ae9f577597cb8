use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use tts_core::SynthError;

use crate::state::SwitchError;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("TTS error: {0}")]
    TtsError(#[from] SynthError),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::UnknownAgent(name) => {
                (StatusCode::BAD_REQUEST, format!("Unknown agent: {name}"))
            }
            ApiError::LlmError(msg) => {
                tracing::error!("LLM error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            // Synthesis being switched off is an operational state, not a
            // server fault.
            ApiError::TtsError(SynthError::Disabled) => {
                (StatusCode::SERVICE_UNAVAILABLE, SynthError::Disabled.to_string())
            }
            ApiError::TtsError(e) => {
                tracing::error!("TTS error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("TTS error: {e}"))
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

impl From<SwitchError> for ApiError {
    fn from(e: SwitchError) -> Self {
        match e {
            SwitchError::Unknown(name) => ApiError::UnknownAgent(name),
            SwitchError::History(e) => {
                ApiError::InternalError(format!("could not save history: {e}"))
            }
        }
    }
}
