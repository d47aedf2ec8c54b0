//! Application State
//!
//! Shared state across all handlers. Models, the retrieval index and the
//! record table are loaded once and shared read-only by every session.

use std::sync::Arc;

use campus_guide_agent::{CampusPipeline, StagePresets};
use campus_guide_config::Settings;
use campus_guide_core::{DocumentRetriever, GenerationConfig, LanguageModel};
use campus_guide_rag::{RecordTable, StructuredOptions, StructuredQueryEngine};
use campus_guide_speech::UploadTranscriber;
use campus_guide_text_processing::{LlmTranslator, Translator};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::session::SessionManager;

/// Per-session options taken from the `/start` request
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Answer sampling parameters; `None` keeps the configured preset
    pub answer: Option<GenerationConfig>,
    pub user_coords: Option<String>,
    pub allow_complex_mode: bool,
}

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub llm: Arc<dyn LanguageModel>,
    pub retriever: Arc<dyn DocumentRetriever>,
    /// Source table for the structured (complex) route
    pub table: Option<Arc<RecordTable>>,
    pub sessions: Arc<SessionManager>,
    pub transcriber: UploadTranscriber,
    pub translator: Arc<dyn Translator>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: Settings,
        llm: Arc<dyn LanguageModel>,
        retriever: Arc<dyn DocumentRetriever>,
        transcriber: UploadTranscriber,
    ) -> Self {
        let translator: Arc<dyn Translator> =
            Arc::new(LlmTranslator::new(Arc::clone(&llm), config.llm.translation));
        Self {
            sessions: Arc::new(SessionManager::new(&config.sessions)),
            config: Arc::new(config),
            llm,
            retriever,
            table: None,
            transcriber,
            translator,
            metrics: None,
        }
    }

    /// Enable the structured route over `table`
    pub fn with_record_table(mut self, table: Arc<RecordTable>) -> Self {
        self.table = Some(table);
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Complex mode needs both the server switch and a record table
    pub fn complex_mode_available(&self) -> bool {
        self.config.pipeline.allow_complex_mode && self.table.is_some()
    }

    /// Build the pipeline for a new session
    pub fn new_pipeline(&self, options: &SessionOptions) -> CampusPipeline {
        let mut presets = StagePresets::from(&self.config.llm);
        if let Some(answer) = options.answer {
            presets.answer = answer;
        }

        let builder = CampusPipeline::builder(Arc::clone(&self.llm), Arc::clone(&self.retriever))
            .presets(presets)
            .retrieval_limit(self.config.rag.limit);

        match (&self.table, options.allow_complex_mode && self.complex_mode_available()) {
            (Some(table), true) => {
                let engine = StructuredQueryEngine::new(
                    table,
                    Arc::clone(&self.llm),
                    options.user_coords.as_deref(),
                    StructuredOptions {
                        generation: self.config.llm.structured,
                        max_results: self.config.pipeline.structured_max_results,
                    },
                );
                builder
                    .structured(Arc::new(engine))
                    .allow_complex_mode(true)
                    .build()
            }
            _ => builder.build(),
        }
    }
}
