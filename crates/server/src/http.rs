//! HTTP Endpoints
//!
//! REST API for the campus guide.

use std::time::{Duration, Instant};

use axum::{
    extract::{DefaultBodyLimit, Json, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use campus_guide_agent::InputKind;
use campus_guide_core::{GenerationConfig, PipelineResult};

use crate::audio_chat::chat_audio;
use crate::metrics::record_turn;
use crate::state::{AppState, SessionOptions};
use crate::ServerError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let server = &state.config.server;
    let cors_layer = build_cors_layer(&server.cors_origins, server.cors_enabled);
    let timeout = Duration::from_secs(server.timeout_seconds);
    let body_limit = server.max_upload_bytes;

    Router::new()
        // Sessions
        .route("/start", post(start_session))
        .route("/end", post(end_session))
        // Chat
        .route("/chat", post(chat))
        .route("/chat_audio", post(chat_audio))
        .route("/translate", post(translate))
        // Health and metrics
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// Disabled CORS or an empty origin list allows any origin.
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];

    if !enabled || origins.is_empty() {
        if enabled {
            tracing::info!("No CORS origins configured, allowing any origin");
        }
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any);
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::error!("All configured CORS origins are invalid, falling back to localhost");
        return CorsLayer::new()
            .allow_origin(HeaderValue::from_static("http://localhost:3000"))
            .allow_methods(methods)
            .allow_headers(Any);
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods(methods)
        .allow_headers(Any)
}

/// Start request; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StartRequest {
    pub model_name: Option<String>,
    pub temperature: Option<f32>,
    pub max_new_tokens: Option<u32>,
    pub user_coords_str: Option<String>,
    pub allow_complex_mode: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub session_id: String,
}

impl StartRequest {
    /// Check the request against the server configuration
    fn session_options(&self, state: &AppState) -> Result<SessionOptions, ServerError> {
        let llm = &state.config.llm;

        if let Some(name) = &self.model_name {
            if !llm.accepts_model_name(name) {
                return Err(ServerError::InvalidRequest(format!(
                    "Invalid model name: {}",
                    name
                )));
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ServerError::InvalidRequest(format!(
                    "temperature must be between 0.0 and 2.0, got {}",
                    temperature
                )));
            }
        }
        if self.max_new_tokens == Some(0) {
            return Err(ServerError::InvalidRequest(
                "max_new_tokens must be greater than 0".to_string(),
            ));
        }

        let answer = match (self.temperature, self.max_new_tokens) {
            (None, None) => None,
            (temperature, max_new_tokens) => Some(GenerationConfig::new(
                temperature.unwrap_or(llm.answer.temperature),
                max_new_tokens.unwrap_or(llm.answer.max_new_tokens),
            )),
        };

        let requested_complex = self
            .allow_complex_mode
            .unwrap_or(state.config.pipeline.allow_complex_mode);

        Ok(SessionOptions {
            answer,
            user_coords: self.user_coords_str.clone().filter(|c| !c.trim().is_empty()),
            allow_complex_mode: requested_complex && state.complex_mode_available(),
        })
    }
}

/// Start a session
async fn start_session(
    State(state): State<AppState>,
    body: Option<Json<StartRequest>>,
) -> Result<Json<StartResponse>, ServerError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let options = request.session_options(&state)?;

    let pipeline = state.new_pipeline(&options);
    let session = state.sessions.insert(pipeline)?;

    tracing::info!(
        session_id = %session.id,
        complex_mode = options.allow_complex_mode,
        user_coords = options.user_coords.is_some(),
        "Session started"
    );
    Ok(Json(StartResponse {
        session_id: session.id.clone(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct EndParams {
    pub session_id: String,
}

/// End a session
async fn end_session(
    State(state): State<AppState>,
    Query(params): Query<EndParams>,
) -> Result<Json<serde_json::Value>, ServerError> {
    if !state.sessions.remove(&params.session_id) {
        return Err(ServerError::SessionNotFound(params.session_id));
    }
    Ok(Json(serde_json::json!({
        "message": format!("Session {} ended.", params.session_id),
    })))
}

/// Chat request
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub query: String,
}

/// Chat response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub link: Option<String>,
}

impl From<PipelineResult> for ChatResponse {
    fn from(result: PipelineResult) -> Self {
        Self {
            response: result.answer,
            link: result.link,
        }
    }
}

/// Chat endpoint
async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ServerError> {
    let session = state
        .sessions
        .get(&request.session_id)
        .ok_or_else(|| ServerError::SessionNotFound(request.session_id.clone()))?;

    if request.query.trim().is_empty() {
        return Err(ServerError::InvalidRequest("query must not be empty".to_string()));
    }

    let start = Instant::now();
    let result = {
        let mut pipeline = session.pipeline.lock().await;
        pipeline.run(&request.query, InputKind::Text).await
    };
    session.touch();

    match result {
        Ok(result) => {
            record_turn("chat", "ok", start.elapsed());
            Ok(Json(ChatResponse::from(result)))
        }
        Err(e) => {
            tracing::error!(session_id = %session.id, error = %e, "Chat turn failed");
            record_turn("chat", "error", start.elapsed());
            Err(e.into())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TranslationRequest {
    pub text: String,
    pub target_language: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranslationResponse {
    pub translated_text: String,
}

/// Translate an answer into the user's language
async fn translate(
    State(state): State<AppState>,
    Json(request): Json<TranslationRequest>,
) -> Result<Json<TranslationResponse>, ServerError> {
    let translated_text = state
        .translator
        .translate(&request.text, &request.target_language)
        .await
        .map_err(|e| ServerError::Translation(e.to_string()))?;

    tracing::debug!(
        translator = state.translator.name(),
        target_language = %request.target_language,
        chars = translated_text.len(),
        "Translated text"
    );
    Ok(Json(TranslationResponse { translated_text }))
}

/// Liveness and basic state
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": {
            "active": state.sessions.count(),
            "capacity": state.sessions.capacity(),
        },
        "llm": state.llm.model_name(),
        "retriever": state.retriever.name(),
        "complex_mode": state.complex_mode_available(),
    }))
}

/// Readiness: the language model backend must answer
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let llm_status =
        match tokio::time::timeout(Duration::from_secs(2), state.llm.is_available()).await {
            Ok(true) => "ok",
            Ok(false) => "unreachable",
            Err(_) => "timeout",
        };
    let ready = llm_status == "ok";

    (
        if ready {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        },
        Json(serde_json::json!({
            "status": if ready { "ready" } else { "not_ready" },
            "checks": { "llm_backend": llm_status },
        })),
    )
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled".to_string()),
    }
}
