//! Audio chat over Server-Sent Events
//!
//! `POST /chat_audio` takes a multipart upload (`session_id`, `file`) and
//! streams two events: the transcript as soon as recognition finishes, then
//! the answer. Dropping the stream (client gone) cancels the turn at its next
//! await point; temporary audio files are removed by their guards.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Multipart, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use serde::Serialize;

use campus_guide_agent::InputKind;
use campus_guide_speech::UploadTranscriber;

use crate::http::ChatResponse;
use crate::metrics::{record_error, record_turn};
use crate::session::Session;
use crate::state::AppState;
use crate::ServerError;

/// One SSE payload: `{"type": ..., "data": ...}`
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AudioChatEvent {
    Transcript(String),
    FinalResponse(ChatResponse),
    Error(String),
}

impl AudioChatEvent {
    fn to_sse(&self) -> Event {
        match Event::default().json_data(self) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode SSE event");
                Event::default().data(r#"{"type":"error","data":"encoding failed"}"#)
            }
        }
    }
}

struct AudioUpload {
    session_id: String,
    file_name: Option<String>,
    bytes: Vec<u8>,
}

async fn read_upload(mut multipart: Multipart) -> Result<AudioUpload, ServerError> {
    let mut session_id = None;
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::InvalidRequest(e.to_string()))?
    {
        match field.name() {
            Some("session_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
                session_id = Some(text.trim().to_string());
            }
            Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
                file = Some((file_name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let session_id = session_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ServerError::InvalidRequest("missing field `session_id`".to_string()))?;
    let (file_name, bytes) =
        file.ok_or_else(|| ServerError::InvalidRequest("missing field `file`".to_string()))?;
    if bytes.is_empty() {
        return Err(ServerError::InvalidRequest("empty audio upload".to_string()));
    }

    Ok(AudioUpload {
        session_id,
        file_name,
        bytes,
    })
}

/// Warns when the stream is dropped before the final event went out
struct DisconnectGuard {
    session_id: String,
    finished: bool,
}

impl DisconnectGuard {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            finished: false,
        }
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(session_id = %self.session_id, "Client disconnected during audio chat");
        }
    }
}

/// Audio chat endpoint
pub async fn chat_audio(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    let upload = read_upload(multipart).await?;
    let session = state
        .sessions
        .get(&upload.session_id)
        .ok_or_else(|| ServerError::SessionNotFound(upload.session_id.clone()))?;

    tracing::debug!(
        session_id = %session.id,
        bytes = upload.bytes.len(),
        file_name = ?upload.file_name,
        "Audio upload received"
    );

    let stream = audio_turn(session, state.transcriber.clone(), upload);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn audio_turn(
    session: Arc<Session>,
    transcriber: UploadTranscriber,
    upload: AudioUpload,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let mut guard = DisconnectGuard::new(&session.id);
        let start = Instant::now();

        let final_event = match transcriber
            .transcribe_upload(&upload.bytes, upload.file_name.as_deref())
            .await
        {
            Ok(transcript) => {
                tracing::info!(session_id = %session.id, transcript = %transcript, "Transcribed audio");
                yield Ok(AudioChatEvent::Transcript(transcript.clone()).to_sse());

                let result = {
                    let mut pipeline = session.pipeline.lock().await;
                    pipeline.run(&transcript, InputKind::Transcript).await
                };
                match result {
                    Ok(result) => {
                        record_turn("chat_audio", "ok", start.elapsed());
                        AudioChatEvent::FinalResponse(ChatResponse::from(result))
                    }
                    Err(e) => {
                        tracing::error!(session_id = %session.id, error = %e, "Audio turn failed");
                        record_turn("chat_audio", "error", start.elapsed());
                        record_error(e.kind());
                        AudioChatEvent::Error(e.to_string())
                    }
                }
            }
            Err(e) => {
                tracing::error!(session_id = %session.id, error = %e, "Transcription failed");
                record_turn("chat_audio", "error", start.elapsed());
                record_error(e.kind());
                AudioChatEvent::Error(e.to_string())
            }
        };

        session.touch();
        guard.finish();
        yield Ok(final_event.to_sse());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_shapes() {
        let transcript = serde_json::to_value(AudioChatEvent::Transcript("Wo ist die Mensa?".into()))
            .unwrap();
        assert_eq!(
            transcript,
            serde_json::json!({"type": "transcript", "data": "Wo ist die Mensa?"})
        );

        let answer = serde_json::to_value(AudioChatEvent::FinalResponse(ChatResponse {
            response: "Am Adenauerring 7.".into(),
            link: None,
        }))
        .unwrap();
        assert_eq!(
            answer,
            serde_json::json!({
                "type": "final_response",
                "data": {"response": "Am Adenauerring 7.", "link": null}
            })
        );

        let error = serde_json::to_value(AudioChatEvent::Error("boom".into())).unwrap();
        assert_eq!(error["type"], "error");
    }
}
