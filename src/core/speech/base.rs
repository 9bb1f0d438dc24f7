use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpeechError {
    #[error("Speech request timed out")]
    Timeout,

    #[error("Speech request failed: {0}")]
    Network(String),

    #[error("Speech service returned HTTP {0}")]
    Status(u16),

    #[error("Invalid audio: {0}")]
    InvalidAudio(String),

    #[error("Invalid speech response: {0}")]
    Decode(String),

    #[error("Speech configuration error: {0}")]
    Configuration(String),
}

impl SpeechError {
    /// Whether the request may succeed if sent again.
    pub fn is_retryable(&self) -> bool {
        match self {
            SpeechError::Timeout | SpeechError::Network(_) => true,
            SpeechError::Status(code) => *code >= 500 || *code == 429,
            _ => false,
        }
    }
}

pub type SpeechResult<T> = Result<T, SpeechError>;

/// Confidence assumed when a recognizer reports a transcript without one.
pub const DEFAULT_CONFIDENCE: f32 = 1.0;

fn default_confidence() -> f32 {
    DEFAULT_CONFIDENCE
}

/// Transcript returned by the recognition capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub transcript: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

/// Text-to-speech and speech-to-text, treated as an opaque async capability.
///
/// All audio crossing this boundary is mono linear PCM at [`sample_rate`].
///
/// [`sample_rate`]: SpeechService::sample_rate
#[async_trait]
pub trait SpeechService: Send + Sync {
    fn sample_rate(&self) -> u32;

    /// Identifies the synthesis voice; part of the prompt cache key.
    fn voice(&self) -> &str;

    async fn synthesize(&self, text: &str) -> SpeechResult<Vec<i16>>;

    async fn recognize(&self, samples: &[i16]) -> SpeechResult<Recognition>;
}
