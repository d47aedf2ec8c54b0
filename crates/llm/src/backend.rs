//! LLM Backend implementations
//!
//! All backends take a fully rendered prompt string and return the cleaned
//! completion. They share one HTTP configuration and one retry policy:
//! network errors, 5xx responses and timeouts are retried with exponential
//! backoff, 4xx responses are returned immediately.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};

use campus_guide_config::LlmSettings;
use campus_guide_core::{GenerationConfig, LanguageModel};

use crate::prompt::clean_response;
use crate::LlmError;

/// HTTP backend configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL of the service
    pub endpoint: String,
    /// Model name/ID (ignored by TGI, which serves a single model)
    pub model: String,
    /// API key (optional)
    pub api_key: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Maximum retry attempts for transient failures
    pub max_retries: u32,
    /// Initial backoff duration (doubles each retry)
    pub initial_backoff: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::from(&LlmSettings::default())
    }
}

impl From<&LlmSettings> for LlmConfig {
    fn from(settings: &LlmSettings) -> Self {
        Self {
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
            max_retries: settings.max_retries,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
        }
    }
}

impl LlmConfig {
    fn client(&self) -> Result<Client, LlmError> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("Failed to create HTTP client: {}", e)))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.trim_end_matches('/'), path)
    }
}

/// Run `op` until it succeeds, fails permanently, or retries are exhausted
async fn with_retries<T, F, Fut>(config: &LlmConfig, backend: &str, mut op: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut last_error = None;
    let mut backoff = config.initial_backoff;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            tracing::warn!(
                backend,
                attempt,
                max_retries = config.max_retries,
                ?backoff,
                "LLM request failed, retrying"
            );
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => last_error = Some(e),
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| LlmError::Network("Max retries exceeded".to_string())))
}

/// Send a JSON request and decode a JSON response, classifying failures
async fn post_json<Req, Resp>(
    client: &Client,
    url: &str,
    api_key: Option<&str>,
    body: &Req,
) -> Result<Resp, LlmError>
where
    Req: Serialize + ?Sized,
    Resp: for<'de> Deserialize<'de>,
{
    let mut request = client.post(url).json(body);
    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        request = request.bearer_auth(key);
    }
    let response = request.send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let error = response.text().await.unwrap_or_default();
        // 5xx errors are retryable, 4xx are not
        if status.is_server_error() {
            return Err(LlmError::Network(format!("Server error {}: {}", status, error)));
        }
        return Err(LlmError::Api(format!("HTTP {}: {}", status, error)));
    }

    response
        .json()
        .await
        .map_err(|e| LlmError::InvalidResponse(e.to_string()))
}

// =============================================================================
// Hugging Face text-generation backend
// =============================================================================

/// Hugging Face text-generation-inference backend (`POST /generate`)
#[derive(Clone)]
pub struct TgiBackend {
    client: Client,
    config: LlmConfig,
}

impl TgiBackend {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            client: config.client()?,
            config,
        })
    }

    fn request(prompt: &str, generation: &GenerationConfig) -> TgiRequest {
        // TGI rejects non-positive temperatures; greedy decoding instead
        let sampling = generation.temperature > 0.0;
        TgiRequest {
            inputs: prompt.to_string(),
            parameters: TgiParameters {
                max_new_tokens: generation.max_new_tokens,
                temperature: sampling.then_some(generation.temperature),
                do_sample: sampling,
                return_full_text: false,
            },
        }
    }

    pub async fn complete(
        &self,
        prompt: &str,
        generation: &GenerationConfig,
    ) -> Result<String, LlmError> {
        let start = Instant::now();
        let request = Self::request(prompt, generation);
        let url = self.config.url("/generate");

        let response: TgiResponse = with_retries(&self.config, "tgi", || {
            post_json(&self.client, &url, self.config.api_key.as_deref(), &request)
        })
        .await?;

        tracing::debug!(
            backend = "tgi",
            elapsed_ms = start.elapsed().as_millis() as u64,
            chars = response.generated_text.len(),
            "Completion received"
        );
        Ok(clean_response(&response.generated_text))
    }
}

#[async_trait]
impl LanguageModel for TgiBackend {
    async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> campus_guide_core::Result<String> {
        Ok(self.complete(prompt, config).await?)
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(self.config.url("/health"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct TgiRequest {
    inputs: String,
    parameters: TgiParameters,
}

#[derive(Debug, Serialize)]
struct TgiParameters {
    max_new_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    do_sample: bool,
    return_full_text: bool,
}

#[derive(Debug, Deserialize)]
struct TgiResponse {
    generated_text: String,
}

// =============================================================================
// Ollama backend
// =============================================================================

/// Ollama backend using raw prompt mode (`POST /api/generate`)
#[derive(Clone)]
pub struct OllamaBackend {
    client: Client,
    config: LlmConfig,
    keep_alive: String,
}

impl OllamaBackend {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            client: config.client()?,
            config,
            keep_alive: "5m".to_string(),
        })
    }

    /// Keep the model loaded between calls ("5m", "1h", "-1")
    pub fn with_keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = keep_alive.into();
        self
    }

    pub async fn complete(
        &self,
        prompt: &str,
        generation: &GenerationConfig,
    ) -> Result<String, LlmError> {
        let request = OllamaGenerateRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            raw: true,
            stream: false,
            options: OllamaOptions {
                temperature: generation.temperature,
                num_predict: generation.max_new_tokens as i32,
            },
            keep_alive: Some(self.keep_alive.clone()),
        };
        let url = self.config.url("/api/generate");

        let response: OllamaGenerateResponse = with_retries(&self.config, "ollama", || {
            post_json(&self.client, &url, None, &request)
        })
        .await?;

        if !response.done {
            tracing::debug!(backend = "ollama", "Generation stopped before completion");
        }
        Ok(clean_response(&response.response))
    }
}

#[async_trait]
impl LanguageModel for OllamaBackend {
    async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> campus_guide_core::Result<String> {
        Ok(self.complete(prompt, config).await?)
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(self.config.url("/api/tags"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    raw: bool,
    stream: bool,
    options: OllamaOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<String>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: i32,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

// =============================================================================
// OpenAI-compatible backend
// =============================================================================

/// OpenAI-compatible backend; the rendered prompt is sent as one user message
///
/// Works with OpenAI, vLLM and local servers exposing `/chat/completions`.
pub struct OpenAiBackend {
    client: Client,
    config: LlmConfig,
}

impl OpenAiBackend {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let local = config.endpoint.starts_with("http://localhost")
            || config.endpoint.starts_with("http://127.0.0.1");
        if config.api_key.as_deref().unwrap_or_default().is_empty() && !local {
            return Err(LlmError::Configuration(
                "API key required for remote endpoints".to_string(),
            ));
        }

        Ok(Self {
            client: config.client()?,
            config,
        })
    }

    pub async fn complete(
        &self,
        prompt: &str,
        generation: &GenerationConfig,
    ) -> Result<String, LlmError> {
        let request = OpenAiChatRequest {
            model: self.config.model.clone(),
            messages: vec![OpenAiMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: generation.max_new_tokens,
            temperature: generation.temperature,
        };
        let url = self.config.url("/chat/completions");

        let response: OpenAiChatResponse = with_retries(&self.config, "openai", || {
            post_json(&self.client, &url, self.config.api_key.as_deref(), &request)
        })
        .await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;
        Ok(clean_response(&choice.message.content))
    }
}

#[async_trait]
impl LanguageModel for OpenAiBackend {
    async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> campus_guide_core::Result<String> {
        Ok(self.complete(prompt, config).await?)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn test_config(endpoint: String) -> LlmConfig {
        LlmConfig {
            endpoint,
            model: "test".to_string(),
            api_key: None,
            timeout: Duration::from_secs(5),
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_config_from_settings() {
        let mut settings = LlmSettings::default();
        settings.endpoint = "http://llm:8081/".to_string();
        settings.timeout_secs = 12;
        let config = LlmConfig::from(&settings);
        assert_eq!(config.endpoint, "http://llm:8081");
        assert_eq!(config.timeout, Duration::from_secs(12));
        assert_eq!(config.url("/generate"), "http://llm:8081/generate");
    }

    #[test]
    fn test_tgi_request_greedy_for_zero_temperature() {
        let request = TgiBackend::request("p", &GenerationConfig::new(0.0, 64));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["parameters"]["do_sample"], false);
        assert!(json["parameters"].get("temperature").is_none());
        assert_eq!(json["parameters"]["max_new_tokens"], 64);

        let request = TgiBackend::request("p", &GenerationConfig::new(0.3, 128));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["parameters"]["do_sample"], true);
        assert_eq!(json["parameters"]["return_full_text"], false);
    }

    #[test]
    fn test_ollama_request_serialization() {
        let request = OllamaGenerateRequest {
            model: "llama3.1:8b".to_string(),
            prompt: "<|begin_of_text|>".to_string(),
            raw: true,
            stream: false,
            options: OllamaOptions {
                temperature: 0.1,
                num_predict: 128,
            },
            keep_alive: Some("5m".to_string()),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"raw\":true"));
        assert!(json.contains("\"num_predict\":128"));
        assert!(json.contains("keep_alive"));
    }

    #[test]
    fn test_openai_requires_key_for_remote() {
        let config = test_config("https://api.openai.com/v1".to_string());
        assert!(OpenAiBackend::new(config).is_err());

        let config = test_config("http://localhost:8000/v1".to_string());
        assert!(OpenAiBackend::new(config).is_ok());
    }

    #[tokio::test]
    async fn test_tgi_generate_cleans_output() {
        let app = Router::new().route(
            "/generate",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["inputs"], "prompt");
                Json(serde_json::json!({ "generated_text": "assistant\n\n Gebäude 50.34 " }))
            }),
        );
        let backend = TgiBackend::new(test_config(serve(app).await)).unwrap();

        let text = backend
            .generate("prompt", &GenerationConfig::new(0.05, 32))
            .await
            .unwrap();
        assert_eq!(text, "Gebäude 50.34");
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let app = Router::new().route(
            "/generate",
            post(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(StatusCode::SERVICE_UNAVAILABLE)
                    } else {
                        Ok(Json(serde_json::json!({ "generated_text": "ok" })))
                    }
                }
            }),
        );
        let backend = TgiBackend::new(test_config(serve(app).await)).unwrap();

        let text = backend.complete("p", &GenerationConfig::default()).await.unwrap();
        assert_eq!(text, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let app = Router::new().route(
            "/generate",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StatusCode::UNPROCESSABLE_ENTITY
                }
            }),
        );
        let backend = TgiBackend::new(test_config(serve(app).await)).unwrap();

        let err = backend
            .complete("p", &GenerationConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Api(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_upstream_error() {
        let mut config = test_config("http://127.0.0.1:1".to_string());
        config.max_retries = 0;
        let backend = TgiBackend::new(config).unwrap();

        let err = backend
            .generate("p", &GenerationConfig::default())
            .await
            .unwrap_err();
        assert!(err.is_upstream());
    }
}
