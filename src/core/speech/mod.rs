//! Speech synthesis and recognition capability.

pub mod base;
pub mod http;

pub use base::{DEFAULT_CONFIDENCE, Recognition, SpeechError, SpeechResult, SpeechService};
pub use http::{HttpSpeechConfig, HttpSpeechService};
