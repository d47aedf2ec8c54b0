//! Speech input for the campus guide
//!
//! Uploaded recordings are normalised to 16 kHz mono PCM WAV with ffmpeg
//! and sent to a remote recognition service.

pub mod asr_client;
pub mod convert;

pub use asr_client::{AsrClientConfig, HttpAsrClient};
pub use convert::{stage_upload, AudioConverter, AudioNormalizer, UploadTranscriber};

use thiserror::Error;

/// Speech errors
#[derive(Error, Debug)]
pub enum SpeechError {
    /// ffmpeg missing, crashed or rejected the input
    #[error("Audio conversion failed: {0}")]
    Conversion(String),

    #[error("Recognition service error: {0}")]
    Recognition(String),

    #[error("Recognition timed out")]
    Timeout,

    #[error("Invalid recognition response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for SpeechError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SpeechError::Timeout
        } else {
            SpeechError::Recognition(err.to_string())
        }
    }
}

impl From<SpeechError> for campus_guide_core::Error {
    fn from(err: SpeechError) -> Self {
        match err {
            SpeechError::Conversion(msg) => campus_guide_core::Error::AudioConversion(msg),
            SpeechError::Timeout => {
                campus_guide_core::Error::Timeout("speech recognition".to_string())
            }
            SpeechError::Io(e) => campus_guide_core::Error::Io(e),
            other => campus_guide_core::Error::Stt(other.to_string()),
        }
    }
}
