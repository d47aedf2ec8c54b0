//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{audio, endpoints, generation, llm, rag, sessions};
use crate::ConfigError;
use campus_guide_core::GenerationConfig;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Language model backend and generation presets
    #[serde(default)]
    pub llm: LlmSettings,

    /// Building records, embeddings and reranking
    #[serde(default)]
    pub rag: RagConfig,

    /// Speech recognition and audio conversion
    #[serde(default)]
    pub asr: AsrConfig,

    /// Session lifecycle
    #[serde(default)]
    pub sessions: SessionConfig,

    /// Query pipeline switches
    #[serde(default)]
    pub pipeline: PipelineSettings,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_llm()?;
        self.validate_rag()?;
        self.validate_sessions()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(invalid("server.port", "Port must be non-zero"));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(invalid("server.max_upload_bytes", "Must be greater than 0"));
        }
        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        if self.llm.endpoint.trim().is_empty() {
            return Err(invalid("llm.endpoint", "Endpoint must not be empty"));
        }
        for (name, preset) in self.llm.presets() {
            if !(0.0..=2.0).contains(&preset.temperature) {
                return Err(invalid(
                    &format!("llm.{}.temperature", name),
                    &format!("Must be between 0.0 and 2.0, got {}", preset.temperature),
                ));
            }
            if preset.max_new_tokens == 0 {
                return Err(invalid(
                    &format!("llm.{}.max_new_tokens", name),
                    "Must be greater than 0",
                ));
            }
        }
        Ok(())
    }

    fn validate_rag(&self) -> Result<(), ConfigError> {
        let rag = &self.rag;
        if rag.data_path.trim().is_empty() {
            return Err(invalid("rag.data_path", "Path must not be empty"));
        }
        if rag.limit == 0 {
            return Err(invalid("rag.limit", "Must be greater than 0"));
        }
        if rag.rerank_multiplier == 0 {
            return Err(invalid("rag.rerank_multiplier", "Must be greater than 0"));
        }
        if rag.embedding.dim == 0 {
            return Err(invalid("rag.embedding.dim", "Must be greater than 0"));
        }
        if rag.reranker.provider == RerankerProvider::Onnx && rag.reranker.model_path.is_none() {
            return Err(ConfigError::MissingField("rag.reranker.model_path".to_string()));
        }
        Ok(())
    }

    fn validate_sessions(&self) -> Result<(), ConfigError> {
        let s = &self.sessions;
        if s.sweep_interval_secs == 0 {
            return Err(invalid("sessions.sweep_interval_secs", "Must be greater than 0"));
        }
        if s.ttl_secs < s.sweep_interval_secs {
            return Err(invalid(
                "sessions.ttl_secs",
                &format!(
                    "TTL ({}s) shorter than sweep interval ({}s)",
                    s.ttl_secs, s.sweep_interval_secs
                ),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins; empty means any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Largest accepted audio upload
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_timeout() -> u64 {
    120
}
fn default_true() -> bool {
    true
}
fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_seconds: default_timeout(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// LLM provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Hugging Face text-generation endpoint
    #[default]
    Tgi,
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
}

/// Language model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default)]
    pub provider: LlmProvider,

    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// Backend model id (Ollama / OpenAI)
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Names accepted by `/start`
    #[serde(default = "default_model_names")]
    pub model_names: Vec<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_answer")]
    pub answer: GenerationConfig,

    #[serde(default = "default_rephrase")]
    pub rephrase: GenerationConfig,

    #[serde(default = "default_router")]
    pub router: GenerationConfig,

    #[serde(default = "default_field_selection")]
    pub field_selection: GenerationConfig,

    #[serde(default = "default_asr_fix")]
    pub asr_fix: GenerationConfig,

    #[serde(default = "default_translation")]
    pub translation: GenerationConfig,

    #[serde(default = "default_structured")]
    pub structured: GenerationConfig,
}

fn preset((temperature, max_new_tokens): (f32, u32)) -> GenerationConfig {
    GenerationConfig {
        temperature,
        max_new_tokens,
    }
}

fn default_llm_endpoint() -> String {
    endpoints::TGI_DEFAULT.to_string()
}
fn default_llm_model() -> String {
    "llama3.1:8b".to_string()
}
fn default_model_names() -> Vec<String> {
    vec![llm::DEFAULT_MODEL_NAME.to_string()]
}
fn default_llm_timeout() -> u64 {
    llm::TIMEOUT_SECS
}
fn default_max_retries() -> u32 {
    llm::MAX_RETRIES
}
fn default_initial_backoff() -> u64 {
    llm::INITIAL_BACKOFF_MS
}
fn default_answer() -> GenerationConfig {
    preset(generation::ANSWER)
}
fn default_rephrase() -> GenerationConfig {
    preset(generation::REPHRASE)
}
fn default_router() -> GenerationConfig {
    preset(generation::ROUTER)
}
fn default_field_selection() -> GenerationConfig {
    preset(generation::FIELD_SELECTION)
}
fn default_asr_fix() -> GenerationConfig {
    preset(generation::ASR_FIX)
}
fn default_translation() -> GenerationConfig {
    preset(generation::TRANSLATION)
}
fn default_structured() -> GenerationConfig {
    preset(generation::STRUCTURED)
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            model_names: default_model_names(),
            api_key: None,
            timeout_secs: default_llm_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            answer: default_answer(),
            rephrase: default_rephrase(),
            router: default_router(),
            field_selection: default_field_selection(),
            asr_fix: default_asr_fix(),
            translation: default_translation(),
            structured: default_structured(),
        }
    }
}

impl LlmSettings {
    /// All generation presets with their config key
    pub fn presets(&self) -> [(&'static str, GenerationConfig); 7] {
        [
            ("answer", self.answer),
            ("rephrase", self.rephrase),
            ("router", self.router),
            ("field_selection", self.field_selection),
            ("asr_fix", self.asr_fix),
            ("translation", self.translation),
            ("structured", self.structured),
        ]
    }

    pub fn accepts_model_name(&self, name: &str) -> bool {
        self.model_names.iter().any(|m| m == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic offline hashing embedder
    #[default]
    Hash,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_dim")]
    pub dim: usize,
}

fn default_embedding_endpoint() -> String {
    endpoints::OLLAMA_DEFAULT.to_string()
}
fn default_embedding_model() -> String {
    rag::EMBEDDING_MODEL.to_string()
}
fn default_embedding_dim() -> usize {
    rag::HASH_EMBEDDING_DIM
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            endpoint: default_embedding_endpoint(),
            model: default_embedding_model(),
            dim: default_embedding_dim(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RerankerProvider {
    /// Token-overlap scorer, no model files needed
    #[default]
    Lexical,
    /// ONNX cross-encoder (requires the `onnx` feature)
    Onnx,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerSettings {
    #[serde(default)]
    pub provider: RerankerProvider,

    #[serde(default)]
    pub model_path: Option<String>,

    #[serde(default)]
    pub tokenizer_path: Option<String>,

    #[serde(default = "default_reranker_max_length")]
    pub max_length: usize,
}

fn default_reranker_max_length() -> usize {
    rag::RERANKER_MAX_LENGTH
}

impl Default for RerankerSettings {
    fn default() -> Self {
        Self {
            provider: RerankerProvider::default(),
            model_path: None,
            tokenizer_path: None,
            max_length: default_reranker_max_length(),
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Building dataset (CSV, JSON or YAML)
    #[serde(default = "default_data_path")]
    pub data_path: String,

    #[serde(default = "default_id_column")]
    pub id_column: String,

    #[serde(default = "default_name_column")]
    pub name_column: String,

    /// Documents per retrieval call
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Embedding candidates per open slot before reranking
    #[serde(default = "default_rerank_multiplier")]
    pub rerank_multiplier: usize,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub reranker: RerankerSettings,
}

fn default_data_path() -> String {
    rag::DATA_PATH.to_string()
}
fn default_id_column() -> String {
    rag::ID_COLUMN.to_string()
}
fn default_name_column() -> String {
    rag::NAME_COLUMN.to_string()
}
fn default_limit() -> usize {
    rag::DEFAULT_LIMIT
}
fn default_rerank_multiplier() -> usize {
    rag::RERANK_MULTIPLIER
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            id_column: default_id_column(),
            name_column: default_name_column(),
            limit: default_limit(),
            rerank_multiplier: default_rerank_multiplier(),
            embedding: EmbeddingSettings::default(),
            reranker: RerankerSettings::default(),
        }
    }
}

/// Speech recognition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrConfig {
    #[serde(default = "default_asr_url")]
    pub url: String,

    #[serde(default = "default_asr_timeout")]
    pub timeout_ms: u64,

    #[serde(default = "default_asr_language")]
    pub language: String,

    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
}

fn default_asr_url() -> String {
    endpoints::ASR_DEFAULT.to_string()
}
fn default_asr_timeout() -> u64 {
    audio::ASR_TIMEOUT_MS
}
fn default_asr_language() -> String {
    audio::ASR_LANGUAGE.to_string()
}
fn default_ffmpeg_path() -> String {
    audio::FFMPEG_BINARY.to_string()
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            url: default_asr_url(),
            timeout_ms: default_asr_timeout(),
            language: default_asr_language(),
            ffmpeg_path: default_ffmpeg_path(),
        }
    }
}

/// Session lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_ttl() -> u64 {
    sessions::TTL_SECS
}
fn default_sweep_interval() -> u64 {
    sessions::SWEEP_INTERVAL_SECS
}
fn default_max_sessions() -> usize {
    sessions::MAX_SESSIONS
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// Query pipeline switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Server-wide permission for the structured (complex) route
    #[serde(default)]
    pub allow_complex_mode: bool,

    /// Row cap for structured query results
    #[serde(default = "default_structured_max_results")]
    pub structured_max_results: usize,
}

fn default_structured_max_results() -> usize {
    10
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            allow_complex_mode: false,
            structured_max_results: default_structured_max_results(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Expose Prometheus metrics at /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (`CAMPUS_GUIDE__` prefix)
/// 2. config/{env}.(yaml|toml) (if env specified)
/// 3. config/default.(yaml|toml)
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("CAMPUS_GUIDE")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    tracing::debug!(
        environment = ?settings.environment,
        provider = ?settings.llm.provider,
        data_path = %settings.rag.data_path,
        "Settings loaded"
    );

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.rag.limit, 5);
        assert_eq!(settings.rag.rerank_multiplier, 3);
        assert_eq!(settings.rag.id_column, "identifikator");
        assert_eq!(settings.sessions.ttl_secs, 3600);
        assert_eq!(settings.sessions.sweep_interval_secs, 600);
        assert!(!settings.pipeline.allow_complex_mode);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_generation_presets() {
        let llm = LlmSettings::default();
        assert_eq!(llm.rephrase.max_new_tokens, 128);
        assert!((llm.rephrase.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(llm.field_selection.max_new_tokens, 1024);
        assert!((llm.asr_fix.temperature - 0.01).abs() < f32::EPSILON);
        assert!(llm.accepts_model_name("Llama3.1-8B"));
        assert!(!llm.accepts_model_name("Qwen3-32B"));
    }

    #[test]
    fn test_rag_validation() {
        let mut settings = Settings::default();
        settings.rag.limit = 0;
        assert!(settings.validate().is_err());

        settings.rag.limit = 5;
        settings.rag.rerank_multiplier = 0;
        assert!(settings.validate().is_err());

        settings.rag.rerank_multiplier = 3;
        settings.rag.reranker.provider = RerankerProvider::Onnx;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn test_temperature_validation() {
        let mut settings = Settings::default();
        settings.llm.router.temperature = 2.5;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("llm.router.temperature"));
    }

    #[test]
    fn test_session_validation() {
        let mut settings = Settings::default();
        settings.sessions.ttl_secs = 60;
        assert!(settings.validate().is_err());

        settings.sessions.sweep_interval_secs = 30;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let json = r#"{ "server": { "port": 9000 }, "rag": { "limit": 7 } }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.rag.limit, 7);
        assert_eq!(settings.rag.rerank_multiplier, 3);
        assert_eq!(settings.llm.provider, LlmProvider::Tgi);
    }

    #[test]
    fn test_provider_names() {
        let provider: LlmProvider = serde_json::from_str("\"openai\"").unwrap();
        assert_eq!(provider, LlmProvider::OpenAi);
        let provider: EmbeddingProvider = serde_json::from_str("\"ollama\"").unwrap();
        assert_eq!(provider, EmbeddingProvider::Ollama);
    }
}
