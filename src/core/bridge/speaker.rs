//! Directive playback: synthesis, caching and resampling, strictly in order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::audio::{TELEPHONY_SAMPLE_RATE, resample};
use crate::core::cache::PromptCache;
use crate::core::conversation::{DigitMode, Directive, DirectiveSink, Prompt};
use crate::core::speech::SpeechService;

use super::BridgeError;

/// Telephony-rate audio for `prompt`, from the cache when the prompt allows it.
pub async fn render_prompt(
    speech: &dyn SpeechService,
    prompts: &PromptCache,
    prompt: &Prompt,
) -> Result<Vec<i16>, BridgeError> {
    let text = prompt.text();
    let audio = if prompt.is_cacheable() {
        prompts.get_or_synthesize(speech, &text).await?
    } else {
        Arc::new(speech.synthesize(&text).await?)
    };
    Ok(resample(&audio, speech.sample_rate(), TELEPHONY_SAMPLE_RATE)?)
}

/// Directive sink that tags each directive with the playback generation
/// current at emission time and counts work handed to the speaker.
pub(super) struct StampedSink {
    tx: mpsc::UnboundedSender<(u64, Directive)>,
    generation: Arc<AtomicU64>,
    pending: Arc<AtomicUsize>,
}

impl StampedSink {
    pub(super) fn new(
        tx: mpsc::UnboundedSender<(u64, Directive)>,
        generation: Arc<AtomicU64>,
        pending: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            tx,
            generation,
            pending,
        }
    }
}

impl DirectiveSink for StampedSink {
    fn emit(&self, directive: Directive) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        let generation = self.generation.load(Ordering::Acquire);
        if self.tx.send((generation, directive)).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            debug!("Speaker stopped, directive dropped");
        }
    }
}

/// What the speaker hands back to the bridge loop.
#[derive(Debug)]
pub(super) enum SpeakerItem {
    Audio {
        generation: u64,
        label: &'static str,
        samples: Vec<i16>,
    },
    Listen {
        generation: u64,
        timeout: Duration,
        mode: DigitMode,
    },
    Transfer,
    Hangup,
    Failed(BridgeError),
}

pub(super) struct Speaker {
    pub speech: Arc<dyn SpeechService>,
    pub prompts: Arc<PromptCache>,
    pub pending: Arc<AtomicUsize>,
    pub cancel: CancellationToken,
}

impl Speaker {
    pub(super) async fn run(
        self,
        mut directives: mpsc::UnboundedReceiver<(u64, Directive)>,
        items: mpsc::UnboundedSender<SpeakerItem>,
    ) {
        loop {
            let (generation, directive) = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = directives.recv() => match next {
                    Some(next) => next,
                    None => break,
                },
            };

            let item = match directive {
                Directive::Speak(prompt) => {
                    let rendered = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break,
                        rendered = render_prompt(self.speech.as_ref(), &self.prompts, &prompt) => rendered,
                    };
                    match rendered {
                        Ok(samples) => SpeakerItem::Audio {
                            generation,
                            label: prompt.name(),
                            samples,
                        },
                        Err(err) => {
                            warn!(prompt = prompt.name(), error = %err, "Prompt synthesis failed");
                            SpeakerItem::Failed(err)
                        }
                    }
                }
                Directive::Listen { timeout, mode } => SpeakerItem::Listen {
                    generation,
                    timeout,
                    mode,
                },
                Directive::Transfer { .. } => SpeakerItem::Transfer,
                Directive::Hangup => SpeakerItem::Hangup,
            };

            self.pending.fetch_sub(1, Ordering::AcqRel);
            if items.send(item).is_err() {
                break;
            }
        }
        debug!("Speaker stopped");
    }
}
