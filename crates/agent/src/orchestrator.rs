//! Pipeline Orchestrator
//!
//! Runs one conversational turn through a fixed sequence of stages:
//!
//! ```text
//! RECEIVED → [ASR_FIXED] → REPHRASED → ROUTED → RETRIEVED → [FIELDS_SELECTED]
//!          → ANSWERED → LINK_CHECKED → DONE
//! ```
//!
//! ASR fixing only runs for transcripts; field selection only runs on the
//! retrieval route. Any stage error fails the turn and leaves the
//! conversation as it was before the turn started.

use std::sync::Arc;
use std::time::Instant;

use campus_guide_config::constants::rag;
use campus_guide_config::LlmSettings;
use campus_guide_core::{
    Conversation, DocumentRetriever, GenerationConfig, LanguageModel, Message, PipelineResult,
    QueryType, Result, RetrievedDocument, StructuredQuery,
};
use campus_guide_text_processing::AsrErrorCorrector;

use crate::field_selector::FieldSelector;
use crate::links;
use crate::responder::{render_documents, ResponseGenerator};
use crate::rephraser::QueryRephraser;
use crate::router::QueryRouter;

/// Origin of the turn's input text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Typed by the user
    Text,
    /// Produced by speech recognition
    Transcript,
}

/// Stage of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Received,
    AsrFixed,
    Rephrased,
    Routed,
    Retrieved,
    FieldsSelected,
    Answered,
    LinkChecked,
    Done,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::Received => "received",
            TurnState::AsrFixed => "asr_fixed",
            TurnState::Rephrased => "rephrased",
            TurnState::Routed => "routed",
            TurnState::Retrieved => "retrieved",
            TurnState::FieldsSelected => "fields_selected",
            TurnState::Answered => "answered",
            TurnState::LinkChecked => "link_checked",
            TurnState::Done => "done",
        }
    }
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Visited states of one turn
struct TurnTrace {
    states: Vec<TurnState>,
    start: Instant,
}

impl TurnTrace {
    fn new() -> Self {
        let mut trace = Self {
            states: Vec::with_capacity(9),
            start: Instant::now(),
        };
        trace.advance(TurnState::Received);
        trace
    }

    fn advance(&mut self, state: TurnState) {
        tracing::debug!(
            state = state.as_str(),
            elapsed_ms = self.start.elapsed().as_millis() as u64,
            "Turn state"
        );
        self.states.push(state);
    }
}

/// Generation parameters of every model-backed stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StagePresets {
    pub answer: GenerationConfig,
    pub rephrase: GenerationConfig,
    pub router: GenerationConfig,
    pub field_selection: GenerationConfig,
    pub asr_fix: GenerationConfig,
}

impl From<&LlmSettings> for StagePresets {
    fn from(settings: &LlmSettings) -> Self {
        Self {
            answer: settings.answer,
            rephrase: settings.rephrase,
            router: settings.router,
            field_selection: settings.field_selection,
            asr_fix: settings.asr_fix,
        }
    }
}

impl Default for StagePresets {
    fn default() -> Self {
        Self::from(&LlmSettings::default())
    }
}

/// Text that goes to the retrieval engine: the rephrased query plus the
/// corrected transcript, which may carry identifiers the rephraser dropped
pub fn retrieval_query(rephrased: &str, fixed_transcript: Option<&str>) -> String {
    match fixed_transcript {
        Some(fixed) if !fixed.trim().is_empty() => format!("{} {}", rephrased, fixed),
        _ => rephrased.to_string(),
    }
}

/// Per-session query pipeline
pub struct CampusPipeline {
    retriever: Arc<dyn DocumentRetriever>,
    structured: Option<Arc<dyn StructuredQuery>>,
    asr_fix: AsrErrorCorrector,
    rephraser: QueryRephraser,
    router: QueryRouter,
    field_selector: FieldSelector,
    responder: ResponseGenerator,
    retrieval_limit: usize,
    conversation: Conversation,
    last_trace: Vec<TurnState>,
}

impl CampusPipeline {
    pub fn builder(
        llm: Arc<dyn LanguageModel>,
        retriever: Arc<dyn DocumentRetriever>,
    ) -> PipelineBuilder {
        PipelineBuilder::new(llm, retriever)
    }

    /// Process one user input and append the exchange to the conversation
    pub async fn run(&mut self, input: &str, kind: InputKind) -> Result<PipelineResult> {
        let mut trace = TurnTrace::new();

        let fixed = match kind {
            InputKind::Transcript => {
                let fixed = self.asr_fix.fix(input).await;
                trace.advance(TurnState::AsrFixed);
                Some(fixed)
            }
            InputKind::Text => None,
        };
        let turn_query = fixed.as_deref().unwrap_or(input);

        let rephrased = self.rephraser.rephrase(&self.conversation, turn_query).await?;
        tracing::info!(rephrased = %rephrased, "Rephrased input");
        trace.advance(TurnState::Rephrased);

        let query_type = self.router.classify(&rephrased, input).await?;
        tracing::info!(query_type = %query_type, "Routed query");
        trace.advance(TurnState::Routed);

        let documents = self
            .gather_documents(query_type, &rephrased, turn_query, fixed.as_deref(), &mut trace)
            .await?;

        let mut next = self.conversation.clone();
        next.push(Message::user(input));
        next.push(Message::retrieved_context(render_documents(&documents)));

        let answer = self.responder.generate(&next).await?;
        trace.advance(TurnState::Answered);
        next.push(Message::assistant(answer.clone()));

        let result = links::to_result(answer);
        trace.advance(TurnState::LinkChecked);

        self.conversation = next;
        trace.advance(TurnState::Done);
        tracing::info!(
            query_type = %query_type,
            documents = documents.len(),
            link = result.link.is_some(),
            elapsed_ms = trace.start.elapsed().as_millis() as u64,
            "Turn complete"
        );
        self.last_trace = trace.states;
        Ok(result)
    }

    async fn gather_documents(
        &self,
        query_type: QueryType,
        rephrased: &str,
        turn_query: &str,
        fixed: Option<&str>,
        trace: &mut TurnTrace,
    ) -> Result<Vec<RetrievedDocument>> {
        if let (QueryType::Complex, Some(engine)) = (query_type, &self.structured) {
            let documents = engine.query(rephrased).await?;
            tracing::debug!(documents = documents.len(), "Structured query complete");
            trace.advance(TurnState::Retrieved);
            return Ok(documents);
        }

        let query = retrieval_query(rephrased, fixed);
        let documents = self.retriever.retrieve(&query, self.retrieval_limit).await?;
        trace.advance(TurnState::Retrieved);

        let documents = self.field_selector.select(turn_query, documents).await?;
        trace.advance(TurnState::FieldsSelected);
        Ok(documents)
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// States visited by the last successful turn
    pub fn last_trace(&self) -> &[TurnState] {
        &self.last_trace
    }

    pub fn allows_complex_mode(&self) -> bool {
        self.router.allows_complex_mode()
    }

    /// Forget the conversation history
    pub fn reset(&mut self) {
        self.conversation.clear();
        self.last_trace.clear();
    }
}

/// Wires a [`CampusPipeline`] from its collaborators
pub struct PipelineBuilder {
    llm: Arc<dyn LanguageModel>,
    retriever: Arc<dyn DocumentRetriever>,
    structured: Option<Arc<dyn StructuredQuery>>,
    presets: StagePresets,
    allow_complex_mode: bool,
    retrieval_limit: usize,
}

impl PipelineBuilder {
    pub fn new(llm: Arc<dyn LanguageModel>, retriever: Arc<dyn DocumentRetriever>) -> Self {
        Self {
            llm,
            retriever,
            structured: None,
            presets: StagePresets::default(),
            allow_complex_mode: false,
            retrieval_limit: rag::DEFAULT_LIMIT,
        }
    }

    /// Engine for the COMPLEX route
    pub fn structured(mut self, engine: Arc<dyn StructuredQuery>) -> Self {
        self.structured = Some(engine);
        self
    }

    /// Allow the router to pick the COMPLEX route; needs a structured engine
    pub fn allow_complex_mode(mut self, allow: bool) -> Self {
        self.allow_complex_mode = allow;
        self
    }

    pub fn presets(mut self, presets: StagePresets) -> Self {
        self.presets = presets;
        self
    }

    /// Override the answer generation parameters only
    pub fn answer_generation(mut self, generation: GenerationConfig) -> Self {
        self.presets.answer = generation;
        self
    }

    pub fn retrieval_limit(mut self, limit: usize) -> Self {
        self.retrieval_limit = limit;
        self
    }

    pub fn build(self) -> CampusPipeline {
        let allow_complex_mode = self.allow_complex_mode && self.structured.is_some();
        if self.allow_complex_mode && !allow_complex_mode {
            tracing::warn!("Complex mode requested without a structured query engine, disabled");
        }

        let llm = self.llm;
        CampusPipeline {
            retriever: self.retriever,
            structured: self.structured,
            asr_fix: AsrErrorCorrector::new(Arc::clone(&llm), self.presets.asr_fix),
            rephraser: QueryRephraser::new(Arc::clone(&llm), self.presets.rephrase),
            router: QueryRouter::new(Arc::clone(&llm), self.presets.router, allow_complex_mode),
            field_selector: FieldSelector::new(Arc::clone(&llm), self.presets.field_selection),
            responder: ResponseGenerator::new(llm, self.presets.answer),
            retrieval_limit: self.retrieval_limit,
            conversation: Conversation::new(),
            last_trace: Vec::new(),
        }
    }
}
