//! Energy-based utterance endpointing.
//!
//! Cuts the continuous inbound stream into utterances for the recognition
//! service. A frame whose RMS level exceeds the threshold counts as speech;
//! an utterance ends after enough trailing silence or when it reaches the
//! maximum length.
//!
//! ```text
//! [Idle] ── speech frame ──► [Speaking] ── silence >= trailing ──► Utterance
//!   ▲                            │
//!   └── too short / reset ───────┘
//! ```

use super::codec::rms_level;

#[derive(Debug, Clone, Copy)]
pub struct EndpointConfig {
    /// RMS level (0.0..=1.0) above which a frame counts as speech.
    pub threshold: f32,
    /// Speech shorter than this is discarded as noise.
    pub min_speech_ms: u32,
    /// Silence that closes an utterance.
    pub trailing_silence_ms: u32,
    /// Utterances are cut at this length.
    pub max_utterance_ms: u32,
    pub sample_rate: u32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            threshold: 0.02,
            min_speech_ms: 200,
            trailing_silence_ms: 700,
            max_utterance_ms: 10_000,
            sample_rate: 8000,
        }
    }
}

/// Accumulates speech and reports complete utterances.
#[derive(Debug)]
pub struct UtteranceDetector {
    config: EndpointConfig,
    buffer: Vec<i16>,
    speech_samples: usize,
    silence_samples: usize,
    speaking: bool,
}

impl UtteranceDetector {
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            config,
            buffer: Vec::new(),
            speech_samples: 0,
            silence_samples: 0,
            speaking: false,
        }
    }

    fn ms_to_samples(&self, ms: u32) -> usize {
        (ms as u64 * self.config.sample_rate as u64 / 1000) as usize
    }

    /// Whether speech is currently being captured.
    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Feed decoded samples; returns a finished utterance when one closes.
    pub fn push(&mut self, samples: &[i16]) -> Option<Vec<i16>> {
        if samples.is_empty() {
            return None;
        }
        let is_speech = rms_level(samples) > self.config.threshold;

        if !self.speaking {
            if !is_speech {
                return None;
            }
            self.speaking = true;
        }

        self.buffer.extend_from_slice(samples);
        if is_speech {
            self.speech_samples += samples.len();
            self.silence_samples = 0;
        } else {
            self.silence_samples += samples.len();
        }

        if self.buffer.len() >= self.ms_to_samples(self.config.max_utterance_ms) {
            return self.finish();
        }
        if self.silence_samples >= self.ms_to_samples(self.config.trailing_silence_ms) {
            return self.finish();
        }
        None
    }

    fn finish(&mut self) -> Option<Vec<i16>> {
        let enough = self.speech_samples >= self.ms_to_samples(self.config.min_speech_ms);
        let mut utterance = std::mem::take(&mut self.buffer);
        self.reset();
        if !enough {
            return None;
        }
        let keep = utterance.len() - self.silence_tail(&utterance);
        utterance.truncate(keep.max(1));
        Some(utterance)
    }

    /// Trailing near-silent samples, trimmed before recognition.
    fn silence_tail(&self, utterance: &[i16]) -> usize {
        let frame = self.ms_to_samples(20).max(1);
        let mut tail = 0;
        for chunk in utterance.rchunks(frame) {
            if rms_level(chunk) > self.config.threshold {
                break;
            }
            tail += chunk.len();
        }
        tail
    }

    /// Drop any partial utterance.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.speech_samples = 0;
        self.silence_samples = 0;
        self.speaking = false;
    }
}
