//! Frame ordering and playout pacing for one call.
//!
//! Inbound: a bounded jitter buffer that releases μ-law payloads strictly in
//! sequence order, holding a few early frames, discarding late duplicates and
//! papering over lost frames with μ-law silence.
//!
//! Outbound: a bounded sample queue that hands out exactly one playout frame
//! per pull, padding with silence on under-run and dropping the oldest audio
//! on over-run.
//!
//! Neither side ever returns an error; anomalies are counted in [`FrameStats`]
//! and logged.

use std::collections::{BTreeMap, VecDeque};

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::codec::{TELEPHONY_SAMPLE_RATE, pcm16_le_to_samples, samples_for_duration};

/// μ-law encoding of a zero sample.
pub const MULAW_SILENCE: u8 = 0xFF;

/// Standard telephony frame duration.
pub const FRAME_DURATION_MS: u32 = 20;

/// A frame jump larger than this is treated as a stream restart instead of a
/// gap to fill.
const MAX_FILL_FRAMES: u64 = 50;

/// One inbound media frame as delivered by the transport.
#[derive(Debug, Clone)]
pub struct MediaFrame {
    pub sequence: u64,
    pub payload: Bytes,
    pub received_at: Instant,
}

impl MediaFrame {
    pub fn new(sequence: u64, payload: Bytes) -> Self {
        Self {
            sequence,
            payload,
            received_at: Instant::now(),
        }
    }
}

/// Counters for everything the processor absorbed instead of failing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames_in: u64,
    pub late_or_duplicate: u64,
    pub reordered: u64,
    pub gap_fills: u64,
    pub resyncs: u64,
    pub underruns: u64,
    pub overrun_dropped_samples: u64,
}

/// Sizing for a [`FrameProcessor`].
#[derive(Debug, Clone, Copy)]
pub struct FrameProcessorConfig {
    /// Maximum number of early frames held while waiting for a missing one.
    pub jitter_window: usize,
    /// Maximum queued outbound audio, in milliseconds.
    pub playout_capacity_ms: u32,
    /// Sample rate of the outbound queue.
    pub sample_rate: u32,
}

impl Default for FrameProcessorConfig {
    fn default() -> Self {
        Self {
            jitter_window: 8,
            playout_capacity_ms: 30_000,
            sample_rate: TELEPHONY_SAMPLE_RATE,
        }
    }
}

/// Reorders inbound frames within a bounded window.
#[derive(Debug)]
struct JitterBuffer {
    window: usize,
    next_expected: Option<u64>,
    pending: BTreeMap<u64, Bytes>,
    frame_bytes: usize,
}

impl JitterBuffer {
    fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            next_expected: None,
            pending: BTreeMap::new(),
            frame_bytes: samples_for_duration(FRAME_DURATION_MS, TELEPHONY_SAMPLE_RATE),
        }
    }

    fn silence(&self) -> Bytes {
        Bytes::from(vec![MULAW_SILENCE; self.frame_bytes])
    }

    fn push(&mut self, frame: MediaFrame, stats: &mut FrameStats) -> Vec<Bytes> {
        stats.frames_in += 1;
        if !frame.payload.is_empty() {
            self.frame_bytes = frame.payload.len();
        }

        let next = *self.next_expected.get_or_insert(frame.sequence);
        let mut ready = Vec::new();

        // A jump either way larger than this means the sender restarted its
        // numbering; release what we hold and follow it.
        if frame.sequence.abs_diff(next) > MAX_FILL_FRAMES {
            stats.resyncs += 1;
            warn!(
                sequence = frame.sequence,
                expected = next,
                "Media sequence jumped, resynchronising"
            );
            ready.extend(std::mem::take(&mut self.pending).into_values());
            ready.push(frame.payload);
            self.next_expected = Some(frame.sequence + 1);
            return ready;
        }

        if frame.sequence < next || self.pending.contains_key(&frame.sequence) {
            stats.late_or_duplicate += 1;
            debug!(
                sequence = frame.sequence,
                expected = next,
                "Discarding late or duplicate media frame"
            );
            return ready;
        }

        if frame.sequence == next {
            ready.push(frame.payload);
            self.next_expected = Some(next + 1);
        } else {
            stats.reordered += 1;
            self.pending.insert(frame.sequence, frame.payload);
        }

        self.drain(&mut ready, stats);
        ready
    }

    /// Release consecutive frames, filling gaps once the window is exceeded.
    fn drain(&mut self, ready: &mut Vec<Bytes>, stats: &mut FrameStats) {
        loop {
            let Some(next) = self.next_expected else {
                return;
            };
            if let Some(payload) = self.pending.remove(&next) {
                ready.push(payload);
                self.next_expected = Some(next + 1);
                continue;
            }
            let Some((&newest, _)) = self.pending.last_key_value() else {
                return;
            };
            if (newest - next) as usize >= self.window {
                stats.gap_fills += 1;
                debug!(sequence = next, "Filling lost media frame with silence");
                ready.push(self.silence());
                self.next_expected = Some(next + 1);
                continue;
            }
            return;
        }
    }

    fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn clear(&mut self) {
        self.pending.clear();
        self.next_expected = None;
    }
}

/// Bounded outbound sample queue with a partial-sample carry for byte input.
#[derive(Debug)]
struct PlayoutBuffer {
    samples: VecDeque<i16>,
    capacity: usize,
    carry: Option<u8>,
}

impl PlayoutBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(16_000)),
            capacity: capacity.max(1),
            carry: None,
        }
    }

    fn push(&mut self, samples: &[i16], stats: &mut FrameStats) {
        self.samples.extend(samples.iter().copied());
        let overflow = self.samples.len().saturating_sub(self.capacity);
        if overflow > 0 {
            self.samples.drain(..overflow);
            stats.overrun_dropped_samples += overflow as u64;
            warn!(
                dropped = overflow,
                total_dropped = stats.overrun_dropped_samples,
                "Playout over-run, dropped oldest queued audio"
            );
        }
    }

    fn push_pcm_bytes(&mut self, bytes: &[u8], stats: &mut FrameStats) {
        let mut input = Vec::with_capacity(bytes.len() + 1);
        if let Some(first) = self.carry.take() {
            input.push(first);
        }
        input.extend_from_slice(bytes);
        if input.len() % 2 == 1 {
            self.carry = input.pop();
        }
        let samples = pcm16_le_to_samples(&input);
        self.push(&samples, stats);
    }

    fn pull(&mut self, count: usize, stats: &mut FrameStats) -> Vec<i16> {
        let available = self.samples.len().min(count);
        let mut frame: Vec<i16> = self.samples.drain(..available).collect();
        if available < count {
            stats.underruns += 1;
            debug!(
                missing = count - available,
                "Playout under-run, padding frame with silence"
            );
            frame.resize(count, 0);
        }
        frame
    }

    fn clear(&mut self) {
        self.samples.clear();
        self.carry = None;
    }
}

/// Per-call frame processor: inbound jitter buffer plus outbound playout queue.
#[derive(Debug)]
pub struct FrameProcessor {
    jitter: JitterBuffer,
    playout: PlayoutBuffer,
    sample_rate: u32,
    stats: FrameStats,
}

impl Default for FrameProcessor {
    fn default() -> Self {
        Self::new(FrameProcessorConfig::default())
    }
}

impl FrameProcessor {
    pub fn new(config: FrameProcessorConfig) -> Self {
        let capacity = samples_for_duration(config.playout_capacity_ms, config.sample_rate);
        Self {
            jitter: JitterBuffer::new(config.jitter_window),
            playout: PlayoutBuffer::new(capacity),
            sample_rate: config.sample_rate,
            stats: FrameStats::default(),
        }
    }

    /// Accept an inbound frame and return the payloads now releasable in order.
    pub fn push(&mut self, frame: MediaFrame) -> Vec<Bytes> {
        self.jitter.push(frame, &mut self.stats)
    }

    /// Number of early frames currently held.
    pub fn held_frames(&self) -> usize {
        self.jitter.pending_len()
    }

    /// Queue synthesized samples for playout.
    pub fn enqueue_playout(&mut self, samples: &[i16]) {
        self.playout.push(samples, &mut self.stats);
    }

    /// Queue little-endian PCM bytes; an odd trailing byte is kept for the next call.
    pub fn enqueue_playout_bytes(&mut self, bytes: &[u8]) {
        self.playout.push_pcm_bytes(bytes, &mut self.stats);
    }

    /// Return exactly one playout frame of `duration_ms`.
    pub fn pull(&mut self, duration_ms: u32) -> Vec<i16> {
        let count = samples_for_duration(duration_ms, self.sample_rate);
        if count == 0 {
            return Vec::new();
        }
        self.playout.pull(count, &mut self.stats)
    }

    /// Samples waiting for playout.
    pub fn queued_samples(&self) -> usize {
        self.playout.samples.len()
    }

    pub fn playout_capacity(&self) -> usize {
        self.playout.capacity
    }

    pub fn has_playout(&self) -> bool {
        !self.playout.samples.is_empty()
    }

    /// Drop queued outbound audio (barge-in, transfer).
    pub fn clear_playout(&mut self) {
        self.playout.clear();
    }

    /// Discard everything buffered in both directions.
    pub fn clear(&mut self) {
        self.jitter.clear();
        self.playout.clear();
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }
}
