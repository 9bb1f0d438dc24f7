//! Audio primitives for the media bridge.
//!
//! - `codec`: μ-law companding, resampling, tone and silence generation
//! - `frames`: per-call jitter buffer and playout queue
//! - `endpoint`: energy-based utterance endpointing for recognition

pub mod codec;
pub mod endpoint;
pub mod frames;

pub use codec::{
    StreamResampler, TELEPHONY_SAMPLE_RATE, decode_mulaw, encode_mulaw, generate_silence,
    generate_tone, resample,
};
pub use endpoint::{EndpointConfig, UtteranceDetector};
pub use frames::{
    FRAME_DURATION_MS, FrameProcessor, FrameProcessorConfig, FrameStats, MediaFrame,
};

/// Errors from the pure audio transforms.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AudioError {
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("Invalid tone frequency: {0} Hz")]
    InvalidFrequency(f32),

    #[error("Invalid duration: {0} ms")]
    InvalidDuration(u32),

    #[error("Empty audio input")]
    EmptyInput,
}
