use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::audio::{
    AudioError, EndpointConfig, FRAME_DURATION_MS, FrameProcessor, MediaFrame, StreamResampler,
    TELEPHONY_SAMPLE_RATE, UtteranceDetector, decode_mulaw, encode_mulaw, generate_silence,
    generate_tone,
};
use crate::core::call_state::Phase;
use crate::core::conversation::router::ESCAPE_KEY;
use crate::core::conversation::{
    CallDriver, CallEvent, DigitMode, Directive, DirectiveSink, DriverError, Prompt,
};

use super::speaker::{Speaker, SpeakerItem, StampedSink};
use super::{
    BridgeConfig, BridgeDeps, BridgeError, BridgeInput, BridgeOutput, StreamMode, StreamStart,
};

const FRAME_INTERVAL: Duration = Duration::from_millis(FRAME_DURATION_MS as u64);

/// Drives one media-stream connection.
pub struct MediaBridge {
    deps: BridgeDeps,
    config: BridgeConfig,
}

impl MediaBridge {
    pub fn new(deps: BridgeDeps, config: BridgeConfig) -> Self {
        Self { deps, config }
    }

    /// Runs the connection until the transport stops or the bridge closes it.
    ///
    /// Events before `start` are dropped. On exit every task spawned for the
    /// call has been cancelled and the call state reflects how it ended.
    pub async fn run(
        &self,
        mut inbound: mpsc::Receiver<BridgeInput>,
        outbound: mpsc::Sender<BridgeOutput>,
    ) -> Result<(), BridgeError> {
        let start = loop {
            match inbound.recv().await {
                Some(BridgeInput::Start(start)) => break start,
                Some(BridgeInput::Stop) | Some(BridgeInput::TransportError(_)) | None => {
                    debug!("Media stream ended before start");
                    return Ok(());
                }
                Some(other) => {
                    debug!(event = other.kind(), "Dropping media event received before start")
                }
            }
        };
        info!(
            call_id = %start.call_id,
            stream_id = %start.stream_id,
            mode = ?start.mode,
            "Media stream started"
        );

        let (call, wiring) = CallBridge::new(&self.deps, &self.config, start, outbound)?;
        call.run(wiring, inbound).await
    }
}

/// How the bridge loop ended.
#[derive(Debug)]
enum End {
    /// The transport sent `stop`.
    Stopped,
    Failed(String),
    /// The bridge closed the stream itself.
    Closed,
}

type Step = Result<Option<End>, BridgeError>;

/// What the caller is expected to answer.
#[derive(Debug, Clone, Copy)]
struct InputWindow {
    mode: DigitMode,
    timeout: Duration,
}

enum Closing {
    Transfer,
    Hangup,
}

struct HoldState {
    next_announcement: Instant,
    last_position: Option<usize>,
    music: Vec<i16>,
}

/// Channel ends consumed by [`CallBridge::run`].
struct Wiring {
    directives: mpsc::UnboundedReceiver<(u64, Directive)>,
    items_tx: mpsc::UnboundedSender<SpeakerItem>,
    items: mpsc::UnboundedReceiver<SpeakerItem>,
    recognized: mpsc::UnboundedReceiver<CallEvent>,
    events: Option<mpsc::UnboundedReceiver<CallEvent>>,
}

fn hold_music(config: &BridgeConfig) -> Result<Vec<i16>, AudioError> {
    let mut music = generate_tone(config.hold_tone_hz, config.hold_tone_ms, TELEPHONY_SAMPLE_RATE)?;
    music.extend(generate_silence(config.hold_gap_ms, TELEPHONY_SAMPLE_RATE)?);
    Ok(music)
}

struct CallBridge<'a> {
    deps: &'a BridgeDeps,
    config: &'a BridgeConfig,
    start: StreamStart,
    outbound: mpsc::Sender<BridgeOutput>,
    cancel: CancellationToken,

    frames: FrameProcessor,
    resampler: StreamResampler,
    detector: UtteranceDetector,

    /// Bumped on barge-in; speaker output from older generations is dropped.
    generation: Arc<AtomicU64>,
    /// Directives handed to the speaker and not yet returned.
    pending: Arc<AtomicUsize>,
    sink: Arc<StampedSink>,
    events: Option<mpsc::UnboundedSender<CallEvent>>,
    recognized_tx: mpsc::UnboundedSender<CallEvent>,

    last_label: Option<&'static str>,
    window: Option<InputWindow>,
    deadline: Option<Instant>,
    digits: String,
    recognizing: bool,
    closing: Option<Closing>,
    hold: Option<HoldState>,
}

impl<'a> CallBridge<'a> {
    fn new(
        deps: &'a BridgeDeps,
        config: &'a BridgeConfig,
        start: StreamStart,
        outbound: mpsc::Sender<BridgeOutput>,
    ) -> Result<(Self, Wiring), BridgeError> {
        let speech_rate = deps.speech.sample_rate();
        let resampler = StreamResampler::new(TELEPHONY_SAMPLE_RATE, speech_rate)?;
        let detector = UtteranceDetector::new(EndpointConfig {
            sample_rate: speech_rate,
            ..config.endpoint
        });

        let generation = Arc::new(AtomicU64::new(0));
        let pending = Arc::new(AtomicUsize::new(0));
        let (directive_tx, directives) = mpsc::unbounded_channel();
        let (items_tx, items) = mpsc::unbounded_channel();
        let (recognized_tx, recognized) = mpsc::unbounded_channel();
        let sink = Arc::new(StampedSink::new(
            directive_tx,
            generation.clone(),
            pending.clone(),
        ));

        let (events_tx, events) = match start.mode {
            StreamMode::Conversation => {
                let (tx, rx) = mpsc::unbounded_channel();
                (Some(tx), Some(rx))
            }
            StreamMode::Hold => (None, None),
        };
        let hold = match start.mode {
            StreamMode::Hold => Some(HoldState {
                next_announcement: Instant::now() + config.hold_announcement_interval,
                last_position: None,
                music: hold_music(config)?,
            }),
            StreamMode::Conversation => None,
        };

        let bridge = Self {
            deps,
            config,
            start,
            outbound,
            cancel: CancellationToken::new(),
            frames: FrameProcessor::new(config.frames),
            resampler,
            detector,
            generation,
            pending,
            sink,
            events: events_tx,
            recognized_tx,
            last_label: None,
            window: None,
            deadline: None,
            digits: String::new(),
            recognizing: false,
            closing: None,
            hold,
        };
        let wiring = Wiring {
            directives,
            items_tx,
            items,
            recognized,
            events,
        };
        Ok((bridge, wiring))
    }

    async fn run(
        mut self,
        wiring: Wiring,
        mut inbound: mpsc::Receiver<BridgeInput>,
    ) -> Result<(), BridgeError> {
        let Wiring {
            directives,
            items_tx,
            mut items,
            mut recognized,
            events,
        } = wiring;

        let speaker = Speaker {
            speech: self.deps.speech.clone(),
            prompts: self.deps.prompts.clone(),
            pending: self.pending.clone(),
            cancel: self.cancel.clone(),
        };
        let speaker = tokio::spawn(speaker.run(directives, items_tx));
        let actor = events.map(|events| {
            tokio::spawn(run_conversation(
                self.deps.driver.clone(),
                self.start.clone(),
                events,
                self.sink.clone(),
                self.cancel.clone(),
            ))
        });

        let mut queue_changes = self.deps.driver.transfers().queue().subscribe();
        let mut ticker = interval(FRAME_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let end = 'bridge: {
            if self.hold.is_some() {
                match self.refresh_hold().await {
                    Ok(None) => {}
                    Ok(Some(end)) => break 'bridge end,
                    Err(err) => break 'bridge End::Failed(err.to_string()),
                }
            }
            loop {
                let deadline = self.deadline;
                let announcement = self.hold.as_ref().map(|hold| hold.next_announcement);
                let holding = self.hold.is_some();

                let step = tokio::select! {
                    input = inbound.recv() => self.on_input(input).await,
                    _ = ticker.tick() => self.on_tick().await,
                    Some(item) = items.recv() => self.on_speaker_item(item).await,
                    Some(event) = recognized.recv() => {
                        self.recognizing = false;
                        self.submit(event);
                        Ok(None)
                    }
                    _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                        self.on_listen_timeout();
                        Ok(None)
                    }
                    _ = sleep_until(announcement.unwrap_or_else(Instant::now)), if announcement.is_some() => {
                        self.announce_hold().await
                    }
                    changed = queue_changes.changed(), if holding => match changed {
                        Ok(()) => self.refresh_hold().await,
                        Err(_) => Ok(Some(End::Closed)),
                    },
                };

                match step {
                    Ok(None) => {}
                    Ok(Some(end)) => break end,
                    Err(err) => {
                        warn!(call_id = %self.start.call_id, error = %err, "Media bridge failed");
                        break End::Failed(err.to_string());
                    }
                }
            }
        };

        self.shutdown(end, actor, speaker).await;
        Ok(())
    }

    async fn send(&self, output: BridgeOutput) -> Result<(), BridgeError> {
        self.outbound
            .send(output)
            .await
            .map_err(|_| BridgeError::TransportClosed)
    }

    fn dispatch(&self, event: CallEvent) {
        if let Some(events) = &self.events
            && events.send(event).is_err()
        {
            debug!(call_id = %self.start.call_id, "Conversation task gone, event dropped");
        }
    }

    /// Delivers caller input and closes the input window.
    fn submit(&mut self, event: CallEvent) {
        self.window = None;
        self.deadline = None;
        self.digits.clear();
        self.detector.reset();
        self.resampler.reset();
        self.dispatch(event);
    }

    async fn on_input(&mut self, input: Option<BridgeInput>) -> Step {
        let Some(input) = input else {
            return Ok(Some(End::Failed("media transport went away".to_string())));
        };
        match input {
            BridgeInput::Stop => Ok(Some(End::Stopped)),
            BridgeInput::TransportError(reason) => Ok(Some(End::Failed(reason))),
            BridgeInput::Media { sequence, payload } => self.on_media(sequence, payload).await,
            BridgeInput::Dtmf(key) => self.on_digit(key).await,
            BridgeInput::Mark(name) => {
                debug!(call_id = %self.start.call_id, mark = %name, "Transport reached mark");
                Ok(None)
            }
            BridgeInput::Start(_) => {
                debug!(call_id = %self.start.call_id, "Ignoring repeated start");
                Ok(None)
            }
        }
    }

    async fn on_media(&mut self, sequence: u64, payload: Bytes) -> Step {
        let released = self.frames.push(MediaFrame::new(sequence, payload));
        if self.hold.is_some() || self.window.is_none() || self.recognizing {
            return Ok(None);
        }

        for payload in released {
            let samples = match decode_mulaw(&payload) {
                Ok(samples) => samples,
                Err(err) => {
                    debug!(call_id = %self.start.call_id, error = %err, "Skipping undecodable frame");
                    continue;
                }
            };
            let resampled = self.resampler.process(&samples);
            let was_speaking = self.detector.is_speaking();
            if let Some(utterance) = self.detector.push(&resampled) {
                self.recognize(utterance);
                return Ok(None);
            }
            if self.detector.is_speaking() {
                if !was_speaking {
                    self.barge_in().await?;
                }
                if let Some(window) = self.window {
                    // The window stays open while the caller is talking.
                    self.deadline = Some(Instant::now() + window.timeout);
                }
            }
        }
        Ok(None)
    }

    fn recognize(&mut self, utterance: Vec<i16>) {
        self.recognizing = true;
        self.deadline = None;

        let speech = self.deps.speech.clone();
        let results = self.recognized_tx.clone();
        let cancel = self.cancel.clone();
        let call_id = self.start.call_id.clone();
        debug!(call_id = %call_id, samples = utterance.len(), "Utterance captured");

        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                result = speech.recognize(&utterance) => result,
            };
            let event = match result {
                Ok(recognition) => CallEvent::Speech {
                    transcript: recognition.transcript,
                    confidence: recognition.confidence,
                },
                Err(err) => {
                    warn!(call_id = %call_id, error = %err, "Recognition failed");
                    CallEvent::SpeechFailed(err.to_string())
                }
            };
            results.send(event).ok();
        });
    }

    async fn on_digit(&mut self, key: char) -> Step {
        if self.hold.is_some() {
            return Ok(None);
        }
        let Some(window) = self.window else {
            // Keys typed ahead of the input window wait for it; a lone
            // escape key is applied at once.
            if key == ESCAPE_KEY && self.digits.is_empty() {
                self.dispatch(CallEvent::Digits(key.to_string()));
            } else {
                self.digits.push(key);
            }
            return Ok(None);
        };
        self.barge_in().await?;
        self.accept_key(window, key);
        Ok(None)
    }

    fn accept_key(&mut self, window: InputWindow, key: char) {
        match window.mode {
            DigitMode::SingleKey => self.submit(CallEvent::Digits(key.to_string())),
            DigitMode::Collect {
                max_digits,
                finish_on,
            } => {
                self.digits.push(key);
                let collected = self.digits.trim_end_matches(finish_on).len();
                if key == finish_on || collected >= max_digits {
                    let digits = std::mem::take(&mut self.digits);
                    self.submit(CallEvent::Digits(digits));
                } else {
                    self.deadline = Some(Instant::now() + window.timeout);
                }
            }
        }
    }

    /// Opens an input window and replays keys typed before it.
    async fn open_window(&mut self, window: InputWindow) -> Result<(), BridgeError> {
        self.window = Some(window);
        self.deadline = None;
        let typed_ahead = std::mem::take(&mut self.digits);
        if typed_ahead.is_empty() {
            return Ok(());
        }
        debug!(call_id = %self.start.call_id, keys = typed_ahead.len(), "Applying typed-ahead keys");
        self.barge_in().await?;
        for key in typed_ahead.chars() {
            let Some(window) = self.window else {
                break;
            };
            self.accept_key(window, key);
        }
        Ok(())
    }

    /// Stops the prompt being played when the caller starts answering.
    async fn barge_in(&mut self) -> Result<(), BridgeError> {
        if !self.frames.has_playout() {
            return Ok(());
        }
        self.frames.clear_playout();
        self.last_label = None;
        self.generation.fetch_add(1, Ordering::AcqRel);
        debug!(call_id = %self.start.call_id, "Caller barged in");
        self.send(BridgeOutput::Clear).await
    }

    fn on_listen_timeout(&mut self) {
        if !self.digits.is_empty() {
            // Keys typed so far are submitted, like a gather timing out.
            let digits = std::mem::take(&mut self.digits);
            self.submit(CallEvent::Digits(digits));
        } else {
            debug!(call_id = %self.start.call_id, "No input before timeout");
            self.submit(CallEvent::Timeout);
        }
    }

    async fn on_speaker_item(&mut self, item: SpeakerItem) -> Step {
        let current = self.generation.load(Ordering::Acquire);
        match item {
            SpeakerItem::Audio {
                generation,
                label,
                samples,
            } => {
                if generation != current {
                    debug!(call_id = %self.start.call_id, prompt = label, "Dropping interrupted prompt");
                    return Ok(None);
                }
                self.frames.enqueue_playout(&samples);
                self.last_label = Some(label);
            }
            SpeakerItem::Listen {
                generation,
                timeout,
                mode,
            } => {
                if generation != current {
                    return Ok(None);
                }
                self.open_window(InputWindow { mode, timeout }).await?;
            }
            SpeakerItem::Transfer => self.closing = Some(Closing::Transfer),
            SpeakerItem::Hangup => self.closing = Some(Closing::Hangup),
            SpeakerItem::Failed(err) => {
                if self.hold.is_none() {
                    self.dispatch(CallEvent::SpeechFailed(err.to_string()));
                }
            }
        }
        self.after_playout().await
    }

    /// Sends one frame per tick, backfilling silence while audio is still
    /// being synthesized.
    async fn on_tick(&mut self) -> Step {
        let producing = self.pending.load(Ordering::Acquire) > 0;
        if let Some(hold) = &self.hold
            && !producing
            && !self.frames.has_playout()
        {
            self.frames.enqueue_playout(&hold.music);
        }

        if self.frames.has_playout() || producing {
            let frame = self.frames.pull(FRAME_DURATION_MS);
            let payload = encode_mulaw(&frame)?;
            self.send(BridgeOutput::Media(Bytes::from(payload))).await?;
            if !self.frames.has_playout()
                && let Some(label) = self.last_label.take()
            {
                self.send(BridgeOutput::Mark(label.to_string())).await?;
            }
        }
        self.after_playout().await
    }

    /// Arms the input timer and performs deferred closes once playout drains.
    async fn after_playout(&mut self) -> Step {
        if self.frames.has_playout() {
            return Ok(None);
        }
        if let Some(window) = self.window
            && self.deadline.is_none()
            && !self.recognizing
        {
            self.deadline = Some(Instant::now() + window.timeout);
        }
        if self.pending.load(Ordering::Acquire) > 0 {
            return Ok(None);
        }
        match self.closing.take() {
            Some(Closing::Hangup) => {
                self.send(BridgeOutput::Close).await?;
                Ok(Some(End::Closed))
            }
            Some(Closing::Transfer) => self.hand_off().await,
            None => Ok(None),
        }
    }

    /// Leaves the stream for the transfer callback: by redirect when
    /// call-control is available, otherwise by closing the stream so the
    /// call continues with the markup that follows it.
    async fn hand_off(&self) -> Step {
        let call_id = self.start.call_id.as_str();
        if let Some(url) = &self.config.transfer_url {
            match self.deps.call_control.redirect(call_id, url).await {
                Ok(()) => {
                    info!(call_id, "Call redirected to transfer");
                    // The provider ends the stream with a stop.
                    return Ok(None);
                }
                Err(err) => debug!(call_id, error = %err, "Redirect unavailable, closing stream"),
            }
        }
        self.send(BridgeOutput::Close).await?;
        Ok(Some(End::Closed))
    }

    async fn announce_hold(&mut self) -> Step {
        let call_id = self.start.call_id.clone();
        let call_id = call_id.as_str();
        if let Some(hold) = &mut self.hold {
            hold.next_announcement = Instant::now() + self.config.hold_announcement_interval;
        }
        let Some(position) = self.deps.driver.transfers().hold_position(call_id) else {
            return self.leave_hold().await;
        };

        self.frames.clear_playout();
        self.sink
            .emit(Directive::Speak(Prompt::HoldPosition { position }));
        if let Err(err) = self.deps.driver.store().touch(call_id, None) {
            debug!(call_id, error = %err, "Held call has no session");
        }
        if let Some(hold) = &mut self.hold {
            hold.last_position = Some(position);
        }
        debug!(call_id, position, "Hold position announced");
        Ok(None)
    }

    /// Re-checks the caller's queue slot after a queue change.
    async fn refresh_hold(&mut self) -> Step {
        let call_id = self.start.call_id.clone();
        let call_id = call_id.as_str();
        match self.deps.driver.transfers().hold_position(call_id) {
            Some(position) => {
                let moved = self
                    .hold
                    .as_ref()
                    .is_some_and(|hold| hold.last_position != Some(position));
                if moved {
                    self.announce_hold().await
                } else {
                    Ok(None)
                }
            }
            None => self.leave_hold().await,
        }
    }

    /// Stops hold music once the caller's queue slot is gone.
    async fn leave_hold(&mut self) -> Step {
        let call_id = self.start.call_id.as_str();
        let dialing = self
            .deps
            .driver
            .store()
            .get_intent(call_id)
            .is_some_and(|intent| intent.target.is_some());
        info!(call_id, dialing, "Caller left the hold queue");
        self.frames.clear_playout();
        self.send(BridgeOutput::Clear).await?;
        self.hand_off().await
    }

    async fn shutdown(mut self, end: End, actor: Option<JoinHandle<()>>, speaker: JoinHandle<()>) {
        let call_id = self.start.call_id.clone();
        self.cancel.cancel();
        self.frames.clear();

        match (&end, self.start.mode) {
            (End::Closed, _) => {}
            (_, StreamMode::Hold) => {
                let transfers = self.deps.driver.transfers();
                if transfers.hold_position(&call_id).is_some() {
                    transfers.finish(&call_id);
                    info!(call_id = %call_id, "Held caller hung up");
                }
            }
            (End::Stopped, StreamMode::Conversation) => {
                let transferring = self
                    .deps
                    .driver
                    .store()
                    .get(&call_id)
                    .is_some_and(|current| current.session.phase == Phase::TransferRequested);
                if transferring {
                    debug!(call_id = %call_id, "Stream ended for transfer, session kept");
                } else {
                    self.dispatch(CallEvent::Hangup);
                }
            }
            (End::Failed(reason), StreamMode::Conversation) => {
                self.dispatch(CallEvent::TransportError(reason.clone()));
            }
        }

        self.events = None;
        if let Some(actor) = actor
            && timeout(self.config.shutdown_grace, actor).await.is_err()
        {
            warn!(call_id = %call_id, "Conversation task did not finish in time");
        }
        speaker.abort();

        let stats = self.frames.stats();
        info!(
            call_id = %call_id,
            ?end,
            frames_in = stats.frames_in,
            late = stats.late_or_duplicate,
            gap_fills = stats.gap_fills,
            underruns = stats.underruns,
            "Media stream closed"
        );
    }
}

/// Feeds events to the driver one at a time.
async fn run_conversation(
    driver: Arc<CallDriver>,
    start: StreamStart,
    mut events: mpsc::UnboundedReceiver<CallEvent>,
    sink: Arc<StampedSink>,
    cancel: CancellationToken,
) {
    let call_id = start.call_id.as_str();
    match driver
        .start(
            call_id,
            Some(&start.stream_id),
            start.caller_phone.clone(),
            sink.as_ref(),
            &cancel,
        )
        .await
    {
        Ok(phase) => debug!(call_id, %phase, "Conversation started"),
        Err(err) => warn!(call_id, error = %err, "Conversation could not start"),
    }

    while let Some(event) = events.recv().await {
        let name = event.name();
        match driver.handle(call_id, event, sink.as_ref(), &cancel).await {
            Ok(outcome) => debug!(call_id, event = name, phase = %outcome.phase, "Event applied"),
            Err(DriverError::Cancelled(_)) | Err(DriverError::UnknownCall(_)) => {
                debug!(call_id, event = name, "Event not applied, call is over")
            }
            Err(err) => warn!(call_id, event = name, error = %err, "Event not applied"),
        }
    }
}
