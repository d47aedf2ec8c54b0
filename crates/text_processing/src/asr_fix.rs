//! ASR error correction
//!
//! Asks the language model to repair recognition noise in a transcript
//! (spelled-out numbers, split building codes, misheard words) without
//! reacting to what the user asked. The corrector never fails: on any
//! backend or output problem the caller gets the original transcript back.

use std::sync::Arc;
use std::time::Instant;

use campus_guide_core::{GenerationConfig, LanguageModel};
use campus_guide_llm::Llama3PromptBuilder;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::similarity::similarity_ratio;

/// Prefix placed before the transcript in the user message
pub const USER_QUERY_PREFIX: &str = "Spracheingabe:";

pub const SYSTEM_PROMPT_ASR_FIX: &str = "\
Deine Aufgabe ist es, Transkribierungsfehler in Benutzereingaben zu beheben, die mit automatischer Spracherkennung transkribiert wurden.
Behebe alle Fehler in der Spracheingabe, die aus der automatischen Spracherkennung stammen könnten. Hier sind einige Beispiele von typischen Fehlern aus der Spracherkennung:

Beispiel 1:
Spracheingabe: Wie finde ich Gebäude 0412?
Wie finde ich Gebäude 04.12?

Beispiel 2:
Spracheingabe: Welche Adresse hat Gebäude einhundert und zwei?
Welche Adresse hat Gebäude 102?

Beispiel 3:
Spracheingabe: Wo ist Gebäude fünfzig Punkt vierunddreißig?
Wo ist Gebäude 50.34?

Korrigiere auch ähnliche Fehler oder Fehler anderer Art, die aus der automatischen Spracherkennung stammen könnten. Ersetze hierzu in der Spracheingabe fehlerhafte Begriffe durch korrigierte Begriffe.
Antworte nicht auf die Fragen in der Spracheingabe, verarbeite lediglich den gegebenen Text. Es ist nicht deine Aufgabe, auf den Inhalt der Spracheingabe zu reagieren.
Antworte in jedem Fall ausschließlich mit einer korrigierten und vollständigen Version der ursprünglichen Spracheingabe. Verändere die Spracheingabe nur, um Fehler zu beheben, die aus der automatischen Spracherkennung stammen könnten. Füge der Spracheingabe keine Wörter hinzu und lasse keine Wörter weg.";

/// Correction that grew past this factor of the input is treated as an answer
const MAX_GROWTH_FACTOR: usize = 2;
const MAX_GROWTH_SLACK: usize = 16;

/// Echo of the input line
static ECHOED_INPUT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*spracheingabe\s*:").unwrap());

static CORRECTION_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(korrektur|korrigiert|korrigierte spracheingabe)\s*:\s*").unwrap());

/// Remarks the model adds around the correction
static REMARK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*([(\[{#*]|//|(hinweis|anmerkung|erklärung|note|explanation)\s*:)").unwrap()
});

/// Outcome of one correction attempt
#[derive(Debug, Clone, PartialEq)]
pub struct AsrCorrection {
    /// Text handed to the rest of the pipeline
    pub text: String,
    /// Similarity between the transcript and `text`
    pub similarity: f32,
    /// False when the original transcript was kept
    pub applied: bool,
}

impl AsrCorrection {
    fn unchanged(raw: &str) -> Self {
        Self {
            text: raw.to_string(),
            similarity: 1.0,
            applied: false,
        }
    }
}

/// LLM-backed transcript corrector
#[derive(Clone)]
pub struct AsrErrorCorrector {
    llm: Arc<dyn LanguageModel>,
    prompt_builder: Llama3PromptBuilder,
    generation: GenerationConfig,
}

impl AsrErrorCorrector {
    pub fn new(llm: Arc<dyn LanguageModel>, generation: GenerationConfig) -> Self {
        Self {
            llm,
            prompt_builder: Llama3PromptBuilder::new(SYSTEM_PROMPT_ASR_FIX),
            generation,
        }
    }

    /// Corrected transcript, or the input unchanged on any failure
    pub async fn fix(&self, raw_transcript: &str) -> String {
        self.correct(raw_transcript).await.text
    }

    /// Run the correction and report how much it changed
    pub async fn correct(&self, raw_transcript: &str) -> AsrCorrection {
        if raw_transcript.trim().is_empty() {
            return AsrCorrection::unchanged(raw_transcript);
        }

        let start = Instant::now();
        let prompt = self
            .prompt_builder
            .single(&format!("{} {}", USER_QUERY_PREFIX, raw_transcript));

        let response = match self.llm.generate(&prompt, &self.generation).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "ASR fix failed, keeping transcript");
                return AsrCorrection::unchanged(raw_transcript);
            }
        };

        let Some(candidate) = extract_correction(&response, raw_transcript) else {
            tracing::warn!(raw = %response, "ASR fix returned no usable text");
            return AsrCorrection::unchanged(raw_transcript);
        };

        let input_len = raw_transcript.chars().count();
        if candidate.chars().count() > input_len * MAX_GROWTH_FACTOR + MAX_GROWTH_SLACK {
            tracing::warn!(
                input_len,
                output_len = candidate.chars().count(),
                "ASR fix output looks like an answer, keeping transcript"
            );
            return AsrCorrection::unchanged(raw_transcript);
        }

        let similarity = similarity_ratio(raw_transcript, &candidate);
        tracing::info!(
            similarity,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fixed ASR input"
        );

        AsrCorrection {
            text: candidate,
            similarity,
            applied: true,
        }
    }
}

/// Pull the corrected sentence out of the completion.
///
/// Echoed `Spracheingabe:` lines and remarks (bracketed, commented or
/// labelled notes) are dropped. Of the remaining lines the one closest to
/// the transcript wins; ties go to the earlier line.
fn extract_correction(response: &str, raw_transcript: &str) -> Option<String> {
    let mut best: Option<(f32, String)> = None;

    for line in response.lines().map(str::trim) {
        if line.is_empty() || ECHOED_INPUT.is_match(line) || REMARK.is_match(line) {
            continue;
        }
        let text = CORRECTION_LABEL.replace(line, "");
        let text = text.trim().trim_matches(|c: char| c == '"' || c == '„' || c == '“');
        if text.is_empty() {
            continue;
        }

        let score = similarity_ratio(raw_transcript, text);
        if best.as_ref().map_or(true, |(top, _)| score > *top) {
            best = Some((score, text.to_string()));
        }
    }

    best.map(|(_, text)| text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use campus_guide_core::{Error, Result};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replies from a fixed queue and records every prompt
    struct ScriptedLlm {
        replies: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    impl ScriptedLlm {
        fn new<I, S>(replies: I) -> Arc<Self>
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
                prompts: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(VecDeque::new()),
                prompts: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        fn prompt(&self, index: usize) -> String {
            self.prompts.lock()[index].clone()
        }

        fn calls(&self) -> usize {
            self.prompts.lock().len()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedLlm {
        async fn generate(&self, prompt: &str, _config: &GenerationConfig) -> Result<String> {
            self.prompts.lock().push(prompt.to_string());
            if self.fail {
                return Err(Error::Llm("connection refused".to_string()));
            }
            self.replies
                .lock()
                .pop_front()
                .ok_or_else(|| Error::Llm("script exhausted".to_string()))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn corrector(llm: Arc<ScriptedLlm>) -> AsrErrorCorrector {
        AsrErrorCorrector::new(llm, GenerationConfig::new(0.01, 1024))
    }

    #[test]
    fn test_extract_correction_ignores_remarks() {
        let raw = "Wo ist Gebäude fünfzig Punkt vierunddreißig?";
        assert_eq!(
            extract_correction(
                "Wo ist Gebäude 50.34?\n(Korrigiert: fünfzig Punkt vierunddreißig -> 50.34)",
                raw
            )
            .as_deref(),
            Some("Wo ist Gebäude 50.34?")
        );
        assert_eq!(
            extract_correction("Wo ist Gebäude 50.34?\nHinweis: Zahl korrigiert.", raw).as_deref(),
            Some("Wo ist Gebäude 50.34?")
        );
        assert_eq!(
            extract_correction("Korrektur: Wo ist Gebäude 50.34?", raw).as_deref(),
            Some("Wo ist Gebäude 50.34?")
        );
        assert_eq!(extract_correction("Spracheingabe: Audimax\n[keine Fehler]", raw), None);
    }

    #[tokio::test]
    async fn test_spelled_out_number_is_fixed() {
        let llm = ScriptedLlm::new(["Wo ist Gebäude 50.34?"]);
        let fixed = corrector(llm.clone())
            .fix("Wo ist Gebäude fünfzig Punkt vierunddreißig?")
            .await;
        assert_eq!(fixed, "Wo ist Gebäude 50.34?");

        let prompt = llm.prompt(0);
        assert!(prompt.contains("Spracheingabe: Wo ist Gebäude fünfzig Punkt vierunddreißig?"));
        assert!(prompt.contains("Transkribierungsfehler"));
    }

    #[tokio::test]
    async fn test_echoed_prefix_is_stripped() {
        let llm = ScriptedLlm::new([
            "Spracheingabe: Wie finde ich Gebäude 0412?\nWie finde ich Gebäude 04.12?",
        ]);
        let correction = corrector(llm).correct("Wie finde ich Gebäude 0412?").await;
        assert_eq!(correction.text, "Wie finde ich Gebäude 04.12?");
        assert!(correction.applied);
        assert!(correction.similarity > 0.9);
    }

    #[tokio::test]
    async fn test_trailing_remark_does_not_replace_correction() {
        let llm = ScriptedLlm::new([
            "Wo ist Gebäude 50.34?\n(Korrigiert: fünfzig Punkt vierunddreißig -> 50.34)",
        ]);
        let fixed = corrector(llm)
            .fix("Wo ist Gebäude fünfzig Punkt vierunddreißig?")
            .await;
        assert_eq!(fixed, "Wo ist Gebäude 50.34?");
    }

    #[tokio::test]
    async fn test_backend_failure_keeps_transcript() {
        let fixed = corrector(ScriptedLlm::failing()).fix("Wo ist die Mensa").await;
        assert_eq!(fixed, "Wo ist die Mensa");
    }

    #[tokio::test]
    async fn test_empty_reply_keeps_transcript() {
        let correction = corrector(ScriptedLlm::new(["  \n "])).correct("Audimax").await;
        assert_eq!(correction.text, "Audimax");
        assert!(!correction.applied);
    }

    #[tokio::test]
    async fn test_answer_instead_of_correction_is_rejected() {
        let answer = "Die Mensa am Adenauerring hat montags bis freitags von 11 bis 14 Uhr \
                      geöffnet und bietet täglich mehrere Linien mit warmen Gerichten an.";
        let fixed = corrector(ScriptedLlm::new([answer])).fix("Mensa offen?").await;
        assert_eq!(fixed, "Mensa offen?");
    }

    #[tokio::test]
    async fn test_blank_input_skips_model() {
        let llm = ScriptedLlm::new(["ignored"]);
        let fixed = corrector(llm.clone()).fix("   ").await;
        assert_eq!(fixed, "   ");
        assert_eq!(llm.calls(), 0);
    }
}
