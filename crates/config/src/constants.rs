//! Centralized constants for the campus guide
//!
//! Default values shared by the settings tree and the components that fall
//! back to them when constructed without configuration.

/// Service endpoints (defaults for local development)
pub mod endpoints {
    /// Text-generation endpoint (Llama 3.1 8B)
    pub const TGI_DEFAULT: &str = "http://127.0.0.1:8081";

    /// Ollama endpoint
    pub const OLLAMA_DEFAULT: &str = "http://localhost:11434";

    /// OpenAI-compatible endpoint
    pub const OPENAI_DEFAULT: &str = "https://api.openai.com/v1";

    /// Speech recognition service
    pub const ASR_DEFAULT: &str = "http://127.0.0.1:8090";
}

/// Retrieval defaults
pub mod rag {
    /// Documents returned per retrieval call
    pub const DEFAULT_LIMIT: usize = 5;

    /// Embedding candidates fetched per open slot before reranking
    pub const RERANK_MULTIPLIER: usize = 3;

    /// Identifier column of the building table
    pub const ID_COLUMN: &str = "identifikator";

    /// Name column of the building table
    pub const NAME_COLUMN: &str = "name";

    /// Building dataset
    pub const DATA_PATH: &str = "data/campusplan_evaluation.csv";

    /// Embedding model served by Ollama
    pub const EMBEDDING_MODEL: &str = "nomic-embed-text";

    /// Dimension of the offline hash embedder
    pub const HASH_EMBEDDING_DIM: usize = 256;

    /// Maximum token length for the ONNX cross-encoder
    pub const RERANKER_MAX_LENGTH: usize = 512;

    /// Upper bound for semantic scores; 1.0 is reserved for exact matches
    pub const MAX_SEMANTIC_SCORE: f32 = 0.999;
}

/// Generation presets per pipeline role, as (temperature, max_new_tokens)
pub mod generation {
    pub const ANSWER: (f32, u32) = (0.05, 1024);
    pub const REPHRASE: (f32, u32) = (0.1, 128);
    pub const ROUTER: (f32, u32) = (0.0, 64);
    pub const FIELD_SELECTION: (f32, u32) = (0.3, 1024);
    pub const ASR_FIX: (f32, u32) = (0.01, 1024);
    pub const TRANSLATION: (f32, u32) = (0.01, 2048);
    pub const STRUCTURED: (f32, u32) = (0.0, 512);
}

/// LLM client defaults
pub mod llm {
    /// Model name accepted by the session start endpoint
    pub const DEFAULT_MODEL_NAME: &str = "Llama3.1-8B";

    pub const TIMEOUT_SECS: u64 = 60;
    pub const MAX_RETRIES: u32 = 2;
    pub const INITIAL_BACKOFF_MS: u64 = 200;
}

/// Session lifecycle
pub mod sessions {
    /// Idle time before a session is removed
    pub const TTL_SECS: u64 = 60 * 60;

    /// Sweep period of the expiry task
    pub const SWEEP_INTERVAL_SECS: u64 = 10 * 60;

    pub const MAX_SESSIONS: usize = 1000;
}

/// Audio handling
pub mod audio {
    pub const SAMPLE_RATE: u32 = 16_000;
    pub const CHANNELS: u16 = 1;
    pub const CODEC: &str = "pcm_s16le";
    pub const FFMPEG_BINARY: &str = "ffmpeg";
    pub const ASR_TIMEOUT_MS: u64 = 60_000;
    pub const ASR_LANGUAGE: &str = "de";
}
