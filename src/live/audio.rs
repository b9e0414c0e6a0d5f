//! Microphone capture and speaker output via cpal.
//!
//! cpal streams are not `Send`, so each one lives on its own thread that
//! holds the stream until its [`MediaTrack`] is stopped. Capture converts the
//! device's native format to mono at the configured input rate; the speaker
//! mixes scheduled segments from a shared timeline in its callback.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::devices::{AudioChunk, MediaTrack, MicrophoneStream};
use super::playback::{AudioOutput, rms};
use crate::config::AudioConfig;
use crate::error::{Result, StudioError};

/// How often a device thread checks whether its track was stopped.
const TRACK_POLL: Duration = Duration::from_millis(20);

/// How long to wait for a device thread to report that its stream is running.
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

// ── Device selection ──────────────────────────────────────────

fn device_name(device: &cpal::Device) -> String {
    device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into())
}

fn select_input(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .input_devices()
            .map_err(|e| StudioError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| d.description().ok().is_some_and(|desc| desc.name() == name))
            .ok_or_else(|| StudioError::Audio(format!("input device '{name}' not found"))),
        None => host
            .default_input_device()
            .ok_or_else(|| StudioError::Audio("no default input device".into())),
    }
}

fn select_output(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .output_devices()
            .map_err(|e| StudioError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| d.description().ok().is_some_and(|desc| desc.name() == name))
            .ok_or_else(|| StudioError::Audio(format!("output device '{name}' not found"))),
        None => host
            .default_output_device()
            .ok_or_else(|| StudioError::Audio("no default output device".into())),
    }
}

/// Names of the available input devices.
///
/// # Errors
///
/// Returns an error if devices cannot be enumerated.
pub fn list_input_devices() -> Result<Vec<String>> {
    let devices = cpal::default_host()
        .input_devices()
        .map_err(|e| StudioError::Audio(format!("cannot enumerate devices: {e}")))?;
    Ok(devices
        .filter_map(|d| d.description().ok().map(|desc| desc.name().to_owned()))
        .collect())
}

/// Names of the available output devices.
///
/// # Errors
///
/// Returns an error if devices cannot be enumerated.
pub fn list_output_devices() -> Result<Vec<String>> {
    let devices = cpal::default_host()
        .output_devices()
        .map_err(|e| StudioError::Audio(format!("cannot enumerate devices: {e}")))?;
    Ok(devices
        .filter_map(|d| d.description().ok().map(|desc| desc.name().to_owned()))
        .collect())
}

/// Run `build` on a dedicated thread and keep its stream alive until `track` stops.
fn spawn_stream_thread<F>(name: &str, track: MediaTrack, build: F) -> Result<()>
where
    F: FnOnce() -> Result<cpal::Stream> + Send + 'static,
{
    let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<Result<()>>(1);
    let thread_name = name.to_owned();
    std::thread::Builder::new()
        .name(format!("sarjo-{name}"))
        .spawn(move || {
            let stream = match build() {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));
            while !track.is_stopped() {
                std::thread::sleep(TRACK_POLL);
            }
            drop(stream);
            info!("{thread_name} stream released");
        })
        .map_err(|e| StudioError::Audio(format!("cannot spawn {name} thread: {e}")))?;

    ready_rx
        .recv_timeout(OPEN_TIMEOUT)
        .map_err(|_| StudioError::Audio(format!("{name} did not start in time")))?
}

// ── Capture ───────────────────────────────────────────────────

/// Open the microphone and stream mono chunks at `config.input_sample_rate`.
///
/// # Errors
///
/// Returns an error if no input device is available or the stream cannot start.
pub fn open_microphone(config: &AudioConfig) -> Result<MicrophoneStream> {
    let (tx, rx) = mpsc::channel(config.capture_buffer_chunks.max(1));
    let track = MediaTrack::new();
    let device_choice = config.input_device.clone();
    let target_rate = config.input_sample_rate;

    spawn_stream_thread("microphone", track.clone(), move || {
        let device = select_input(device_choice.as_deref())?;
        info!("using input device: {}", device_name(&device));

        let default_config = device
            .default_input_config()
            .map_err(|e| StudioError::Audio(format!("no default input config: {e}")))?;
        let native_rate = default_config.sample_rate();
        let native_channels = default_config.channels();
        let stream_config = StreamConfig {
            channels: native_channels,
            sample_rate: native_rate,
            buffer_size: cpal::BufferSize::Default,
        };
        info!("native input config: {native_rate}Hz, {native_channels} channels -> {target_rate}Hz mono");

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let mono = if native_channels > 1 {
                        to_mono(data, native_channels)
                    } else {
                        data.to_vec()
                    };
                    let chunk = AudioChunk {
                        samples: resample(&mono, native_rate, target_rate),
                        sample_rate: target_rate,
                    };
                    if tx.try_send(chunk).is_err() {
                        debug!("capture channel full, dropping chunk");
                    }
                },
                move |err| {
                    error!("audio input stream error: {err}");
                },
                None,
            )
            .map_err(|e| StudioError::Audio(format!("failed to build input stream: {e}")))?;
        stream
            .play()
            .map_err(|e| StudioError::Audio(format!("failed to start input stream: {e}")))?;
        Ok(stream)
    })?;

    info!("microphone open");
    Ok(MicrophoneStream { chunks: rx, track })
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = usize::from(channels);
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear-interpolation resampler.
pub(crate) fn resample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() || dst_rate == 0 {
        return samples.to_vec();
    }

    let ratio = f64::from(src_rate) / f64::from(dst_rate);
    let out_len = (samples.len() as f64 / ratio) as usize;
    let last = samples.len() - 1;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx.min(last)];
            let b = samples[(idx + 1).min(last)];
            a + (b - a) * frac
        })
        .collect()
}

// ── Output ────────────────────────────────────────────────────

struct Segment {
    start_frame: u64,
    samples: Vec<f32>,
}

impl Segment {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Shared between the output callback and the session.
#[derive(Default)]
struct Timeline {
    frames_rendered: u64,
    segments: Vec<Segment>,
    level: f32,
}

impl Timeline {
    /// Fill an interleaved buffer of `channels` channels, writing the mono
    /// mix to every channel of each frame.
    fn render(&mut self, data: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let base = self.frames_rendered;
        let mut frames = 0u64;
        for (offset, frame_out) in data.chunks_mut(channels).enumerate() {
            let frame = base + offset as u64;
            let sample = self
                .segments
                .iter()
                .filter(|s| frame >= s.start_frame && frame < s.end_frame())
                .map(|s| s.samples[(frame - s.start_frame) as usize])
                .sum::<f32>()
                .clamp(-1.0, 1.0);
            frame_out.fill(sample);
            frames += 1;
        }
        self.frames_rendered += frames;
        let rendered = self.frames_rendered;
        self.segments.retain(|s| s.end_frame() > rendered);
        self.level = rms(data);
    }
}

/// Speaker output mixing scheduled segments on a sample-accurate timeline.
pub struct CpalSpeaker {
    timeline: Arc<Mutex<Timeline>>,
    track: MediaTrack,
    sample_rate: u32,
}

impl CpalSpeaker {
    /// Open the configured output device at `config.output_sample_rate`.
    ///
    /// The stream uses the device's native channel count; the mono model
    /// audio is duplicated across channels.
    ///
    /// # Errors
    ///
    /// Returns an error if no output device is available or the stream cannot start.
    pub fn open(config: &AudioConfig) -> Result<Self> {
        let timeline = Arc::new(Mutex::new(Timeline::default()));
        let track = MediaTrack::new();
        let sample_rate = config.output_sample_rate;
        let device_choice = config.output_device.clone();
        let callback_timeline = Arc::clone(&timeline);

        spawn_stream_thread("speaker", track.clone(), move || {
            let device = select_output(device_choice.as_deref())?;
            let channels = device
                .default_output_config()
                .map(|c| c.channels())
                .unwrap_or(1)
                .max(1);
            info!("using output device: {} ({channels} channels)", device_name(&device));
            let stream_config = StreamConfig {
                channels,
                sample_rate,
                buffer_size: cpal::BufferSize::Default,
            };
            let stream = device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                        match callback_timeline.lock() {
                            Ok(mut timeline) => timeline.render(data, usize::from(channels)),
                            Err(_) => data.fill(0.0),
                        }
                    },
                    move |err| {
                        error!("audio output stream error: {err}");
                    },
                    None,
                )
                .map_err(|e| StudioError::Audio(format!("failed to build output stream: {e}")))?;
            stream
                .play()
                .map_err(|e| StudioError::Audio(format!("failed to start output stream: {e}")))?;
            Ok(stream)
        })?;

        info!("speaker open at {sample_rate}Hz");
        Ok(Self {
            timeline,
            track,
            sample_rate,
        })
    }

    fn timeline(&self) -> MutexGuard<'_, Timeline> {
        self.timeline.lock().unwrap_or_else(|e| {
            warn!("speaker timeline lock poisoned, recovering");
            e.into_inner()
        })
    }
}

impl AudioOutput for CpalSpeaker {
    fn current_time(&self) -> f64 {
        self.timeline().frames_rendered as f64 / f64::from(self.sample_rate.max(1))
    }

    fn schedule(&self, samples: Vec<f32>, start_at: f64) {
        if samples.is_empty() || self.track.is_stopped() {
            return;
        }
        let start_frame = (start_at.max(0.0) * f64::from(self.sample_rate)).round() as u64;
        self.timeline().segments.push(Segment {
            start_frame,
            samples,
        });
    }

    fn stop_all(&self) {
        let mut timeline = self.timeline();
        timeline.segments.clear();
        timeline.level = 0.0;
    }

    fn active_sources(&self) -> usize {
        self.timeline().segments.len()
    }

    fn level(&self) -> f32 {
        self.timeline().level
    }

    fn close(&self) {
        self.stop_all();
        self.track.stop();
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for CpalSpeaker {
    fn drop(&mut self) {
        self.track.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_mono_averages_channels() {
        assert_eq!(to_mono(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
    }

    #[test]
    fn resample_down_and_up() {
        let input: Vec<f32> = (0..48).map(|i| i as f32).collect();
        let down = resample(&input, 48_000, 16_000);
        assert_eq!(down.len(), 16);
        assert_eq!(down[1], 3.0);

        let up = resample(&[0.0, 1.0], 16_000, 32_000);
        assert_eq!(up, vec![0.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn resample_same_rate_is_identity() {
        assert_eq!(resample(&[0.25, -0.25], 16_000, 16_000), vec![0.25, -0.25]);
    }

    #[test]
    fn timeline_mixes_segments_at_their_frames() {
        let mut timeline = Timeline::default();
        timeline.segments.push(Segment {
            start_frame: 2,
            samples: vec![0.5, 0.5],
        });
        timeline.segments.push(Segment {
            start_frame: 3,
            samples: vec![0.25],
        });

        let mut out = vec![9.0; 4];
        timeline.render(&mut out, 1);
        assert_eq!(out, vec![0.0, 0.0, 0.5, 0.75]);
        assert_eq!(timeline.frames_rendered, 4);
        assert!(timeline.segments.is_empty());
        assert!(timeline.level > 0.0);
    }

    #[test]
    fn timeline_duplicates_mono_across_channels() {
        let mut timeline = Timeline::default();
        timeline.segments.push(Segment {
            start_frame: 1,
            samples: vec![0.5, -0.25],
        });

        let mut out = vec![9.0; 6];
        timeline.render(&mut out, 2);
        assert_eq!(out, vec![0.0, 0.0, 0.5, 0.5, -0.25, -0.25]);
        assert_eq!(timeline.frames_rendered, 3);
        assert!(timeline.segments.is_empty());
    }

    #[test]
    fn timeline_keeps_unfinished_segments() {
        let mut timeline = Timeline::default();
        timeline.segments.push(Segment {
            start_frame: 0,
            samples: vec![0.1; 10],
        });
        let mut out = vec![0.0; 4];
        timeline.render(&mut out, 1);
        assert_eq!(timeline.segments.len(), 1);
    }
}
