//! Audio conversion
//!
//! Every upload is staged to a temporary file and converted with ffmpeg to
//! the recogniser's input format. All intermediate files are `TempPath`s,
//! so they are removed when the owning future completes, fails or is
//! dropped mid-flight.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use campus_guide_config::constants::audio;
use campus_guide_config::AsrConfig;
use campus_guide_core::SpeechToText;
use tempfile::TempPath;
use tokio::process::Command;

use crate::SpeechError;

/// Write uploaded bytes to a temporary file, keeping the extension so
/// ffmpeg can probe the container
pub async fn stage_upload(bytes: &[u8], file_name: Option<&str>) -> Result<TempPath, SpeechError> {
    let suffix = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();

    let path = tempfile::Builder::new()
        .prefix("campus-guide-upload-")
        .suffix(&suffix)
        .tempfile()?
        .into_temp_path();
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

/// Turns a staged upload into the recogniser's input format
#[async_trait]
pub trait AudioNormalizer: Send + Sync + 'static {
    async fn normalize(&self, input: &Path) -> Result<TempPath, SpeechError>;
}

/// ffmpeg wrapper producing 16 kHz mono PCM WAV files
#[derive(Debug, Clone)]
pub struct AudioConverter {
    ffmpeg_path: String,
}

impl Default for AudioConverter {
    fn default() -> Self {
        Self::new(audio::FFMPEG_BINARY)
    }
}

impl AudioConverter {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    pub fn from_config(config: &AsrConfig) -> Self {
        Self::new(config.ffmpeg_path.clone())
    }

    /// Convert `input` to a self-deleting WAV file
    pub async fn to_wav(&self, input: &Path) -> Result<TempPath, SpeechError> {
        let output = tempfile::Builder::new()
            .prefix("campus-guide-")
            .suffix(".wav")
            .tempfile()?
            .into_temp_path();

        let start = Instant::now();
        let result = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(input)
            .args(["-acodec", audio::CODEC])
            .args(["-ar", &audio::SAMPLE_RATE.to_string()])
            .args(["-ac", &audio::CHANNELS.to_string()])
            .arg("-y")
            .arg(&*output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                SpeechError::Conversion(format!("failed to run {}: {}", self.ffmpeg_path, e))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(SpeechError::Conversion(format!(
                "ffmpeg exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        tracing::debug!(
            input = %input.display(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Converted audio to WAV"
        );
        Ok(output)
    }
}

#[async_trait]
impl AudioNormalizer for AudioConverter {
    async fn normalize(&self, input: &Path) -> Result<TempPath, SpeechError> {
        self.to_wav(input).await
    }
}

/// Upload-to-text path used by the audio chat endpoint
#[derive(Clone)]
pub struct UploadTranscriber {
    normalizer: Arc<dyn AudioNormalizer>,
    asr: Arc<dyn SpeechToText>,
}

impl UploadTranscriber {
    pub fn new(normalizer: impl AudioNormalizer, asr: Arc<dyn SpeechToText>) -> Self {
        Self {
            normalizer: Arc::new(normalizer),
            asr,
        }
    }

    /// Stage, convert and transcribe one recording
    pub async fn transcribe_upload(
        &self,
        bytes: &[u8],
        file_name: Option<&str>,
    ) -> campus_guide_core::Result<String> {
        let upload = stage_upload(bytes, file_name).await?;
        let wav = self.normalizer.normalize(&upload).await?;
        drop(upload);

        let text = self.asr.transcribe(&wav).await?;
        tracing::info!(
            model = self.asr.model_name(),
            chars = text.len(),
            "Transcribed upload"
        );
        Ok(text)
    }
}
