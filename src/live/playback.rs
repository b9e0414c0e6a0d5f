//! Gapless scheduling of model audio and the 16-bit PCM wire codec.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::{Result, StudioError};

/// Speaker output with a clock and a set of scheduled sources.
///
/// Times are seconds on the output's own clock.
pub trait AudioOutput: Send + Sync {
    /// Current playback position.
    fn current_time(&self) -> f64;

    /// Queue `samples` (at the output rate) to start at `start_at`.
    fn schedule(&self, samples: Vec<f32>, start_at: f64);

    /// Stop and forget every scheduled source.
    fn stop_all(&self);

    /// Number of scheduled sources that have not finished playing.
    fn active_sources(&self) -> usize;

    /// RMS of the audio most recently rendered, in `0.0..=1.0`.
    fn level(&self) -> f32;

    /// Release the device. Idempotent.
    fn close(&self);

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;
}

/// Places incoming chunks back to back on an [`AudioOutput`] timeline.
#[derive(Debug, Default, Clone)]
pub struct PlaybackScheduler {
    next_start_time: f64,
}

impl PlaybackScheduler {
    /// Scheduler starting at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Where the next chunk will start, unless the output clock has passed it.
    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    /// Schedule `samples` at `max(next_start_time, current_time)` and advance.
    ///
    /// Returns the start time used.
    pub fn schedule(&mut self, output: &dyn AudioOutput, samples: Vec<f32>) -> f64 {
        let rate = output.sample_rate().max(1);
        let duration = samples.len() as f64 / f64::from(rate);
        let start = self.next_start_time.max(output.current_time());
        output.schedule(samples, start);
        self.next_start_time = start + duration;
        start
    }

    /// Forget the timeline, e.g. after an interruption.
    pub fn reset(&mut self) {
        self.next_start_time = 0.0;
    }
}

/// Encode float samples as base64 little-endian 16-bit PCM.
pub fn encode_pcm16(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    BASE64.encode(bytes)
}

/// Decode base64 little-endian 16-bit PCM into float samples (÷ 32768).
///
/// # Errors
///
/// Returns [`StudioError::Audio`] when the payload is not valid base64.
pub fn decode_pcm16(data: &str) -> Result<Vec<f32>> {
    let bytes = BASE64
        .decode(data.trim())
        .map_err(|e| StudioError::Audio(format!("invalid PCM payload: {e}")))?;
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect())
}

/// Sample rate declared in a MIME type such as `audio/pcm;rate=24000`.
pub fn mime_rate(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.trim().parse().ok())
}

/// Root-mean-square level of `samples`, clamped to `0.0..=1.0`.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt().min(1.0)
}
