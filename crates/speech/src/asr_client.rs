//! HTTP speech recognition client
//!
//! Uploads a converted WAV file to a recognition service and reads back
//! the transcript. The service contract is `POST {url}/transcribe` with a
//! multipart body (`file`, `language`) and a JSON reply `{"text": ...}`.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::{Duration, Instant};

use campus_guide_config::AsrConfig;
use campus_guide_core::SpeechToText;

use crate::SpeechError;

/// Recognition client configuration
#[derive(Debug, Clone)]
pub struct AsrClientConfig {
    /// Base URL of the recognition service
    pub url: String,
    /// Language hint, e.g. "de"
    pub language: String,
    pub timeout: Duration,
}

impl From<&AsrConfig> for AsrClientConfig {
    fn from(config: &AsrConfig) -> Self {
        Self {
            url: config.url.trim_end_matches('/').to_string(),
            language: config.language.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

impl Default for AsrClientConfig {
    fn default() -> Self {
        Self::from(&AsrConfig::default())
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    error: Option<String>,
}

pub struct HttpAsrClient {
    config: AsrClientConfig,
    client: reqwest::Client,
}

impl HttpAsrClient {
    pub fn new(config: AsrClientConfig) -> Result<Self, SpeechError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SpeechError::Recognition(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    async fn request(&self, audio_path: &Path) -> Result<String, SpeechError> {
        let bytes = tokio::fs::read(audio_path).await?;
        let audio_len = bytes.len();

        let file = reqwest::multipart::Part::bytes(bytes)
            .file_name("audio.wav")
            .mime_str("audio/wav")?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("language", self.config.language.clone());

        let start = Instant::now();
        let response = self
            .client
            .post(format!("{}/transcribe", self.config.url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Recognition(format!("{}: {}", status, body)));
        }

        let result: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::InvalidResponse(e.to_string()))?;
        if let Some(error) = result.error.filter(|e| !e.is_empty()) {
            return Err(SpeechError::Recognition(error));
        }

        tracing::debug!(
            audio_bytes = audio_len,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Recognition complete"
        );
        Ok(result.text.trim().to_string())
    }
}

#[async_trait]
impl SpeechToText for HttpAsrClient {
    async fn transcribe(&self, audio_path: &Path) -> campus_guide_core::Result<String> {
        Ok(self.request(audio_path).await?)
    }

    fn model_name(&self) -> &str {
        "http_asr"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Multipart, http::StatusCode, routing::post, Json, Router};
    use serde_json::json;
    use std::io::Write;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(url: String) -> HttpAsrClient {
        HttpAsrClient::new(AsrClientConfig {
            url,
            language: "de".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn wav_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        file.write_all(b"RIFF\0\0\0\0WAVE").unwrap();
        file
    }

    #[tokio::test]
    async fn test_transcribe_uploads_file_and_language() {
        let app = Router::new().route(
            "/transcribe",
            post(|mut multipart: Multipart| async move {
                let mut file_len = 0;
                let mut language = String::new();
                while let Some(field) = multipart.next_field().await.unwrap() {
                    match field.name() {
                        Some("file") => file_len = field.bytes().await.unwrap().len(),
                        Some("language") => language = field.text().await.unwrap(),
                        _ => {}
                    }
                }
                Json(json!({ "text": format!(" {} bytes {} ", file_len, language) }))
            }),
        );
        let url = serve(app).await;

        let audio = wav_file();
        let text = client(url).transcribe(audio.path()).await.unwrap();
        assert_eq!(text, "12 bytes de");
    }

    #[tokio::test]
    async fn test_service_error_status() {
        let app = Router::new().route(
            "/transcribe",
            post(|| async { (StatusCode::BAD_GATEWAY, "model not loaded") }),
        );
        let url = serve(app).await;

        let audio = wav_file();
        let err = client(url).transcribe(audio.path()).await.unwrap_err();
        assert!(err.is_upstream());
        assert!(err.to_string().contains("model not loaded"));
    }

    #[tokio::test]
    async fn test_error_field_in_reply() {
        let app = Router::new().route(
            "/transcribe",
            post(|| async { Json(json!({ "text": "", "error": "audio too short" })) }),
        );
        let url = serve(app).await;

        let audio = wav_file();
        let err = client(url).request(audio.path()).await.unwrap_err();
        assert!(matches!(err, SpeechError::Recognition(msg) if msg == "audio too short"));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let err = client("http://127.0.0.1:9".to_string())
            .request(Path::new("/nonexistent/audio.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, SpeechError::Io(_)));
    }
}
