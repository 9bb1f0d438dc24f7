//! Telephony audio conversions.
//!
//! Pure functions for moving between the 8-bit μ-law (G.711) payloads carried
//! by the media transport and the 16-bit linear PCM used by the speech service,
//! plus linear-interpolation resampling and simple signal generators used for
//! hold tone and comfort silence.
//!
//! Every function validates its input and returns an [`AudioError`] instead of
//! an empty buffer, so "no audio" is never confused with "bad request".

use std::f32::consts::PI;

use super::AudioError;

/// Sample rate of telephony audio on the media stream.
pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;

/// Bias added to the magnitude before companding (G.711).
const MULAW_BIAS: i32 = 0x84;
/// Largest magnitude that survives the bias without overflowing 15 bits.
const MULAW_CLIP: i32 = 32635;

/// Amplitude used for generated tones (about -10 dBFS).
const TONE_AMPLITUDE: f32 = 0.3 * i16::MAX as f32;

/// Encode one linear sample to μ-law.
#[inline]
pub fn linear_to_mulaw(sample: i16) -> u8 {
    let mut magnitude = sample as i32;
    let sign = if magnitude < 0 {
        magnitude = -magnitude;
        0x80
    } else {
        0x00
    };

    magnitude = magnitude.min(MULAW_CLIP) + MULAW_BIAS;

    let mut exponent: i32 = 7;
    let mut mask: i32 = 0x4000;
    while exponent > 0 && magnitude & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }

    let mantissa = (magnitude >> (exponent + 3)) & 0x0F;
    !((sign | (exponent << 4) | mantissa) as u8)
}

/// Decode one μ-law byte to a linear sample.
#[inline]
pub fn mulaw_to_linear(byte: u8) -> i16 {
    let byte = !byte;
    let sign = byte & 0x80;
    let exponent = ((byte >> 4) & 0x07) as i32;
    let mantissa = (byte & 0x0F) as i32;

    let magnitude = ((((mantissa << 3) + MULAW_BIAS) << exponent) - MULAW_BIAS) as i16;
    if sign != 0 { -magnitude } else { magnitude }
}

/// Encode linear PCM samples to μ-law, one byte per sample.
pub fn encode_mulaw(samples: &[i16]) -> Result<Vec<u8>, AudioError> {
    if samples.is_empty() {
        return Err(AudioError::EmptyInput);
    }
    Ok(samples.iter().map(|&s| linear_to_mulaw(s)).collect())
}

/// Decode μ-law bytes to linear PCM samples.
pub fn decode_mulaw(bytes: &[u8]) -> Result<Vec<i16>, AudioError> {
    if bytes.is_empty() {
        return Err(AudioError::EmptyInput);
    }
    Ok(bytes.iter().map(|&b| mulaw_to_linear(b)).collect())
}

/// Number of samples covering `duration_ms` at `sample_rate`.
pub fn samples_for_duration(duration_ms: u32, sample_rate: u32) -> usize {
    (duration_ms as u64 * sample_rate as u64 / 1000) as usize
}

fn check_rate(sample_rate: u32) -> Result<(), AudioError> {
    if sample_rate == 0 {
        return Err(AudioError::InvalidSampleRate(sample_rate));
    }
    Ok(())
}

/// Resample a complete buffer with linear interpolation.
///
/// The output length is `round(len * to / from)`. Each output position is
/// computed from its absolute index (`i * from / to`) rather than by adding a
/// step repeatedly, so long buffers do not drift.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Result<Vec<i16>, AudioError> {
    check_rate(from_rate)?;
    check_rate(to_rate)?;
    if samples.is_empty() {
        return Err(AudioError::EmptyInput);
    }
    if from_rate == to_rate {
        return Ok(samples.to_vec());
    }

    let from = from_rate as u64;
    let to = to_rate as u64;
    let len = samples.len() as u64;
    let out_len = ((len * to + from / 2) / from).max(1) as usize;
    let last = samples.len() - 1;

    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len as u64 {
        let numerator = i * from;
        let index = (numerator / to) as usize;
        let frac = (numerator % to) as f32 / to as f32;
        let a = samples[index.min(last)] as f32;
        let b = samples[(index + 1).min(last)] as f32;
        out.push((a + (b - a) * frac).round() as i16);
    }
    Ok(out)
}

/// Chunk-by-chunk resampler for a continuous stream.
///
/// Positions are derived from the total number of samples produced so far
/// (`produced * from / to`), using integer arithmetic, so the output rate stays
/// exact no matter how many chunks a call lasts.
#[derive(Debug)]
pub struct StreamResampler {
    from_rate: u64,
    to_rate: u64,
    /// Absolute input index of `pending[0]`.
    base: u64,
    pending: Vec<i16>,
    produced: u64,
}

impl StreamResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self, AudioError> {
        check_rate(from_rate)?;
        check_rate(to_rate)?;
        Ok(Self {
            from_rate: from_rate as u64,
            to_rate: to_rate as u64,
            base: 0,
            pending: Vec::new(),
            produced: 0,
        })
    }

    /// Feed the next chunk and return every output sample that can be computed.
    ///
    /// An output sample needs its right-hand neighbour, so the last input
    /// sample is held back until the following chunk arrives.
    pub fn process(&mut self, chunk: &[i16]) -> Vec<i16> {
        if self.from_rate == self.to_rate {
            self.produced += chunk.len() as u64;
            return chunk.to_vec();
        }

        self.pending.extend_from_slice(chunk);
        let total = self.base + self.pending.len() as u64;

        let mut out = Vec::new();
        loop {
            let numerator = self.produced * self.from_rate;
            let index = numerator / self.to_rate;
            if index + 1 >= total {
                break;
            }
            let frac = (numerator % self.to_rate) as f32 / self.to_rate as f32;
            let local = (index - self.base) as usize;
            let a = self.pending[local] as f32;
            let b = self.pending[local + 1] as f32;
            out.push((a + (b - a) * frac).round() as i16);
            self.produced += 1;
        }

        let next_index = self.produced * self.from_rate / self.to_rate;
        let consumed = (next_index.saturating_sub(self.base) as usize).min(self.pending.len());
        self.pending.drain(..consumed);
        self.base += consumed as u64;

        out
    }

    /// Total output samples produced since creation.
    pub fn produced(&self) -> u64 {
        self.produced
    }

    pub fn reset(&mut self) {
        self.base = 0;
        self.pending.clear();
        self.produced = 0;
    }
}

/// Generate a sine tone.
pub fn generate_tone(
    frequency_hz: f32,
    duration_ms: u32,
    sample_rate: u32,
) -> Result<Vec<i16>, AudioError> {
    check_rate(sample_rate)?;
    if !(frequency_hz > 0.0) || frequency_hz * 2.0 > sample_rate as f32 {
        return Err(AudioError::InvalidFrequency(frequency_hz));
    }
    let count = samples_for_duration(duration_ms, sample_rate);
    if count == 0 {
        return Err(AudioError::InvalidDuration(duration_ms));
    }

    let cycles_per_sample = frequency_hz as f64 / sample_rate as f64;
    Ok((0..count)
        .map(|n| {
            // Phase from the absolute index keeps long tones in tune.
            let phase = (n as f64 * cycles_per_sample).fract() as f32 * 2.0 * PI;
            (phase.sin() * TONE_AMPLITUDE) as i16
        })
        .collect())
}

/// Generate digital silence.
pub fn generate_silence(duration_ms: u32, sample_rate: u32) -> Result<Vec<i16>, AudioError> {
    check_rate(sample_rate)?;
    let count = samples_for_duration(duration_ms, sample_rate);
    if count == 0 {
        return Err(AudioError::InvalidDuration(duration_ms));
    }
    Ok(vec![0; count])
}

/// Interpret little-endian 16-bit PCM bytes. A trailing odd byte is ignored;
/// callers that stream bytes keep it for the next chunk (see `PlayoutBuffer`).
pub fn pcm16_le_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

pub fn samples_to_pcm16_le(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

/// Root-mean-square level of a buffer, normalised to `0.0..=1.0`.
pub fn rms_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64 / i16::MAX as f64;
            v * v
        })
        .sum();
    (sum / samples.len() as f64).sqrt() as f32
}
