//! Per-connection media bridge.
//!
//! A [`MediaBridge`] owns one media-stream connection from `start` to `stop`.
//! It is transport agnostic: the WebSocket handler decodes envelopes into
//! [`BridgeInput`]s and encodes the [`BridgeOutput`]s it gets back.
//!
//! Inside a bridge:
//! - inbound μ-law frames go through the jitter buffer and, while the call is
//!   listening, through the resampler and endpoint detector to recognition
//! - keypad input is collected according to the phase's digit mode
//! - the conversation driver runs on its own task, one event at a time
//! - a speaker task turns directives into telephony audio in order
//! - a 20 ms ticker paces playout at real-time speed

mod media_bridge;
mod speaker;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::core::audio::{AudioError, EndpointConfig, FrameProcessorConfig};
use crate::core::cache::PromptCache;
use crate::core::call_control::CallControl;
use crate::core::conversation::{CallDriver, DriverError};
use crate::core::speech::{SpeechError, SpeechService};

pub use media_bridge::MediaBridge;
pub use speaker::render_prompt;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Speech error: {0}")]
    Speech(#[from] SpeechError),

    #[error("Conversation error: {0}")]
    Driver(#[from] DriverError),

    #[error("Transport closed")]
    TransportClosed,
}

/// How the stream was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamMode {
    /// The automated job-menu conversation.
    #[default]
    Conversation,
    /// Hold music and position announcements for a queued caller.
    Hold,
}

/// Parameters carried by the transport's `start` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStart {
    pub call_id: String,
    pub stream_id: String,
    pub caller_phone: Option<String>,
    pub mode: StreamMode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeInput {
    Start(StreamStart),
    /// One μ-law frame.
    Media { sequence: u64, payload: Bytes },
    Dtmf(char),
    /// The transport finished playing up to a mark.
    Mark(String),
    Stop,
    TransportError(String),
}

impl BridgeInput {
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeInput::Start(_) => "start",
            BridgeInput::Media { .. } => "media",
            BridgeInput::Dtmf(_) => "dtmf",
            BridgeInput::Mark(_) => "mark",
            BridgeInput::Stop => "stop",
            BridgeInput::TransportError(_) => "transport_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutput {
    /// One 20 ms μ-law playout frame.
    Media(Bytes),
    /// Playback reached the end of a prompt.
    Mark(String),
    /// Flush audio the transport has buffered.
    Clear,
    /// The bridge is done; close the connection.
    Close,
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub frames: FrameProcessorConfig,
    /// Endpointing parameters; the sample rate is taken from the speech service.
    pub endpoint: EndpointConfig,
    pub hold_announcement_interval: Duration,
    pub hold_tone_hz: f32,
    pub hold_tone_ms: u32,
    pub hold_gap_ms: u32,
    /// Callback the call is redirected to when the conversation escalates.
    pub transfer_url: Option<String>,
    /// How long teardown waits for the conversation task.
    pub shutdown_grace: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            frames: FrameProcessorConfig::default(),
            endpoint: EndpointConfig::default(),
            hold_announcement_interval: Duration::from_secs(30),
            hold_tone_hz: 440.0,
            hold_tone_ms: 400,
            hold_gap_ms: 1600,
            transfer_url: None,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

/// Shared services a bridge needs.
#[derive(Clone)]
pub struct BridgeDeps {
    pub driver: Arc<CallDriver>,
    pub speech: Arc<dyn SpeechService>,
    pub prompts: Arc<PromptCache>,
    pub call_control: Arc<dyn CallControl>,
}
