//! Campus Guide Server
//!
//! HTTP endpoints for sessions, text and audio chat, translation and
//! Prometheus metrics.

pub mod audio_chat;
pub mod http;
pub mod metrics;
pub mod session;
pub mod state;

pub use http::create_router;
pub use metrics::{init_metrics, record_error, record_turn, set_active_sessions};
pub use session::{Session, SessionManager};
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Session limit reached")]
    Capacity,

    #[error("Translation failed: {0}")]
    Translation(String),

    #[error(transparent)]
    Pipeline(#[from] campus_guide_core::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Capacity => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Pipeline(campus_guide_core::Error::SessionNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            ServerError::Translation(_)
            | ServerError::Pipeline(_)
            | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::SessionNotFound(_) => "session_not_found",
            ServerError::InvalidRequest(_) => "invalid_request",
            ServerError::Capacity => "capacity",
            ServerError::Translation(_) => "translation",
            ServerError::Pipeline(err) => err.kind(),
            ServerError::Internal(_) => "internal",
        }
    }

    /// Message shown to clients; upstream details stay in the logs
    fn detail(&self) -> String {
        match self {
            ServerError::SessionNotFound(_) => "Session not found.".to_string(),
            ServerError::Translation(_) => "Translation service failed.".to_string(),
            ServerError::Pipeline(_) | ServerError::Internal(_) => {
                "The request could not be processed.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "Request failed");
        } else {
            tracing::debug!(error = %self, kind = self.kind(), "Request rejected");
        }
        record_error(self.kind());

        (status, Json(serde_json::json!({ "detail": self.detail() }))).into_response()
    }
}
