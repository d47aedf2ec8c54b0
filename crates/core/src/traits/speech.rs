//! Speech processing traits

use crate::Result;
use async_trait::async_trait;
use std::path::Path;

/// Speech-to-Text interface
///
/// Implementations:
/// - `HttpAsrClient` - remote recognition service, 16 kHz mono WAV input
///
/// # Example
///
/// ```ignore
/// let asr: Arc<dyn SpeechToText> = Arc::new(HttpAsrClient::new(config)?);
/// let text = asr.transcribe(wav.as_ref()).await?;
/// ```
#[async_trait]
pub trait SpeechToText: Send + Sync + 'static {
    /// Transcribe a 16 kHz mono PCM WAV file
    async fn transcribe(&self, audio_path: &Path) -> Result<String>;

    /// Model name for logging
    fn model_name(&self) -> &str;
}
