//! Router-level tests against in-memory collaborators

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempPath;
use tower::ServiceExt;

use campus_guide_config::Settings;
use campus_guide_core::{
    DocumentRetriever, Error, FieldMap, GenerationConfig, LanguageModel, Result,
    RetrievedDocument, SpeechToText,
};
use campus_guide_server::{create_router, AppState};
use campus_guide_speech::{AudioConverter, AudioNormalizer, SpeechError, UploadTranscriber};
use campus_guide_text_processing::Translator;

const NAVIGATION: &str = "https://www.google.com/maps/dir/?api=1&destination=49.0117,8.4163";

/// Answers every pipeline stage with a fixed, plausible reply
struct StageLlm;

#[async_trait]
impl LanguageModel for StageLlm {
    async fn generate(&self, prompt: &str, _config: &GenerationConfig) -> Result<String> {
        let reply = if prompt.contains("rephrases user queries") {
            "Wo ist die Mensa am Adenauerring?".to_string()
        } else if prompt.contains("Vorauswahlsystem") {
            r#"["name", "adresse"]"#.to_string()
        } else if prompt.contains("Du bist CampusGuide") {
            format!("Die Mensa liegt am Adenauerring 7. Navigation: {}", NAVIGATION)
        } else if prompt.contains("Translate the following text to English") {
            "The canteen is at Adenauerring 7.".to_string()
        } else {
            String::new()
        };
        Ok(reply)
    }

    fn model_name(&self) -> &str {
        "stage"
    }
}

struct OneBuilding;

#[async_trait]
impl DocumentRetriever for OneBuilding {
    async fn retrieve(&self, _query: &str, _limit: usize) -> Result<Vec<RetrievedDocument>> {
        let data: FieldMap = [
            ("name".to_string(), json!("Mensa am Adenauerring")),
            ("adresse".to_string(), json!("Adenauerring 7")),
        ]
        .into_iter()
        .collect();
        Ok(vec![RetrievedDocument::new("01.12", data, 0.82)])
    }

    fn name(&self) -> &str {
        "one_building"
    }
}

struct NoSpeech;

#[async_trait]
impl SpeechToText for NoSpeech {
    async fn transcribe(&self, _audio_path: &Path) -> Result<String> {
        Err(Error::Stt("not available".to_string()))
    }

    fn model_name(&self) -> &str {
        "none"
    }
}

/// Recogniser that hears a fixed sentence in any readable recording
struct Hears(&'static str);

#[async_trait]
impl SpeechToText for Hears {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(audio_path).await?;
        assert_eq!(bytes, b"not-really-audio");
        Ok(self.0.to_string())
    }

    fn model_name(&self) -> &str {
        "hears"
    }
}

/// Copies the upload instead of running ffmpeg
struct CopyAudio;

#[async_trait]
impl AudioNormalizer for CopyAudio {
    async fn normalize(&self, input: &Path) -> std::result::Result<TempPath, SpeechError> {
        let output = tempfile::NamedTempFile::new()?.into_temp_path();
        tokio::fs::copy(input, &output).await?;
        Ok(output)
    }
}

struct BrokenTranslator;

#[async_trait]
impl Translator for BrokenTranslator {
    async fn translate(&self, _text: &str, _target_language: &str) -> Result<String> {
        Err(Error::Llm("backend down".to_string()))
    }

    fn name(&self) -> &str {
        "broken"
    }
}

fn state_with(settings: Settings) -> AppState {
    let transcriber = UploadTranscriber::new(
        AudioConverter::new("/nonexistent/ffmpeg-for-tests"),
        Arc::new(NoSpeech),
    );
    AppState::new(settings, Arc::new(StageLlm), Arc::new(OneBuilding), transcriber)
}

fn app() -> Router {
    create_router(state_with(Settings::default()))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

async fn start(app: &Router) -> String {
    let (status, body) = send(app, post_json("/start", json!({}))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let value: Value = serde_json::from_str(&body).unwrap();
    value["session_id"].as_str().unwrap().to_string()
}

fn audio_upload(session_id: &str) -> Request<Body> {
    let boundary = "campus-guide-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"session_id\"\r\n\r\n{id}\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"recording.webm\"\r\n\
         Content-Type: audio/webm\r\n\r\nnot-really-audio\r\n--{b}--\r\n",
        b = boundary,
        id = session_id
    );
    Request::builder()
        .method("POST")
        .uri("/chat_audio")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_start_accepts_empty_and_rejects_unknown_model() {
    let app = app();

    let request = Request::builder()
        .method("POST")
        .uri("/start")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, post_json("/start", json!({"model_name": "Qwen3-32B"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Invalid model name"));

    let (status, _) = send(&app, post_json("/start", json!({"temperature": 3.5}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_returns_answer_and_link() {
    let app = app();
    let session_id = start(&app).await;

    let (status, body) = send(
        &app,
        post_json(
            "/chat",
            json!({"session_id": session_id, "query": "Wo ist die Mensa?"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let value: Value = serde_json::from_str(&body).unwrap();
    assert!(value["response"].as_str().unwrap().contains("Adenauerring 7"));
    assert!(value["response"].as_str().unwrap().contains(NAVIGATION));
    assert_eq!(value["link"], NAVIGATION);
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let app = app();

    let (status, body) = send(
        &app,
        post_json("/chat", json!({"session_id": "missing", "query": "Hallo"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        serde_json::from_str::<Value>(&body).unwrap()["detail"],
        "Session not found."
    );

    let (status, _) = send(&app, audio_upload("missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_end_session_frees_it() {
    let app = app();
    let session_id = start(&app).await;
    let end = || {
        Request::builder()
            .method("POST")
            .uri(format!("/end?session_id={}", session_id))
            .body(Body::empty())
            .unwrap()
    };

    let (status, body) = send(&app, end()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(&format!("Session {} ended.", session_id)));

    let (status, _) = send(&app, end()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        post_json("/chat", json!({"session_id": session_id, "query": "Hallo"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_session_limit_is_503() {
    let mut settings = Settings::default();
    settings.sessions.max_sessions = 1;
    let app = create_router(state_with(settings));

    start(&app).await;
    let (status, _) = send(&app, post_json("/start", json!({}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_audio_chat_streams_error_event_on_conversion_failure() {
    let app = app();
    let session_id = start(&app).await;

    let response = app.clone().oneshot(audio_upload(&session_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8_lossy(&bytes);
    let event = body
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .unwrap();
    let event: Value = serde_json::from_str(event).unwrap();
    assert_eq!(event["type"], "error");
    assert!(!body.contains("final_response"));
}

#[tokio::test]
async fn test_audio_chat_streams_transcript_then_answer() {
    let transcriber = UploadTranscriber::new(CopyAudio, Arc::new(Hears("Wo ist die Mensa?")));
    let app = create_router(AppState::new(
        Settings::default(),
        Arc::new(StageLlm),
        Arc::new(OneBuilding),
        transcriber,
    ));
    let session_id = start(&app).await;

    let (status, body) = send(&app, audio_upload(&session_id)).await;
    assert_eq!(status, StatusCode::OK);

    let events: Vec<Value> = body
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();
    assert_eq!(events.len(), 2, "{}", body);

    assert_eq!(events[0]["type"], "transcript");
    assert_eq!(events[0]["data"], "Wo ist die Mensa?");

    assert_eq!(events[1]["type"], "final_response");
    assert!(events[1]["data"]["response"]
        .as_str()
        .unwrap()
        .contains("Adenauerring 7"));
    assert_eq!(events[1]["data"]["link"], NAVIGATION);
}

#[tokio::test]
async fn test_audio_chat_requires_file() {
    let app = app();
    let session_id = start(&app).await;
    let body = format!(
        "--b\r\nContent-Disposition: form-data; name=\"session_id\"\r\n\r\n{}\r\n--b--\r\n",
        session_id
    );
    let request = Request::builder()
        .method("POST")
        .uri("/chat_audio")
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=b")
        .body(Body::from(body))
        .unwrap();

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_translate() {
    let app = app();
    let (status, body) = send(
        &app,
        post_json(
            "/translate",
            json!({"text": "Die Mensa liegt am Adenauerring 7.", "target_language": "English"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        serde_json::from_str::<Value>(&body).unwrap()["translated_text"],
        "The canteen is at Adenauerring 7."
    );

    let broken = create_router(
        state_with(Settings::default()).with_translator(Arc::new(BrokenTranslator)),
    );
    let (status, body) = send(
        &broken,
        post_json("/translate", json!({"text": "Hallo", "target_language": "English"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("Translation service failed."));
}

#[tokio::test]
async fn test_health_and_disabled_metrics() {
    let app = app();

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["status"], "healthy");
    assert_eq!(value["retriever"], "one_building");
    assert_eq!(value["complex_mode"], false);

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
