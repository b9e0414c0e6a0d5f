//! Media device seam for live sessions.
//!
//! A session opens a microphone, a speaker and, for the one-to-one variant,
//! a camera through [`MediaDevices`]. Each open device is paired with a
//! [`MediaTrack`] that releases it when stopped.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::camera::{FrameSource, StillFrameSource};
use super::playback::AudioOutput;
use crate::config::{AudioConfig, LiveConfig};
use crate::error::Result;

/// A chunk of captured mono audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Samples in `-1.0..=1.0`.
    pub samples: Vec<f32>,
    /// Rate of `samples` in Hz.
    pub sample_rate: u32,
}

/// Stop handle of an open device.
#[derive(Debug, Clone, Default)]
pub struct MediaTrack {
    token: CancellationToken,
}

impl MediaTrack {
    /// A live track.
    pub fn new() -> Self {
        Self::default()
    }

    /// Release the device. Idempotent.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the track is stopped.
    pub async fn stopped(&self) {
        self.token.cancelled().await;
    }
}

/// An open microphone.
#[derive(Debug)]
pub struct MicrophoneStream {
    /// Captured chunks at the configured input rate. Overflow drops chunks.
    pub chunks: mpsc::Receiver<AudioChunk>,
    /// Releases the microphone.
    pub track: MediaTrack,
}

/// An open camera.
pub struct CameraStream {
    /// Produces encoded snapshots.
    pub source: Box<dyn FrameSource>,
    /// Releases the camera.
    pub track: MediaTrack,
}

/// Opens the devices a live session needs.
pub trait MediaDevices: Send + Sync {
    /// Open the microphone.
    ///
    /// # Errors
    ///
    /// Returns an error when no input device can be opened.
    fn open_microphone(&self) -> Result<MicrophoneStream>;

    /// Open the speaker.
    ///
    /// # Errors
    ///
    /// Returns an error when no output device can be opened.
    fn open_speaker(&self) -> Result<Arc<dyn AudioOutput>>;

    /// Open the camera.
    ///
    /// # Errors
    ///
    /// Returns an error when no frame source is available.
    fn open_camera(&self) -> Result<CameraStream>;
}

/// The machine's audio devices plus the configured still-frame camera.
#[derive(Debug, Clone)]
pub struct SystemDevices {
    audio: AudioConfig,
    live: LiveConfig,
}

impl SystemDevices {
    /// Devices described by the given configuration.
    pub fn new(audio: AudioConfig, live: LiveConfig) -> Self {
        Self { audio, live }
    }
}

impl MediaDevices for SystemDevices {
    fn open_microphone(&self) -> Result<MicrophoneStream> {
        super::audio::open_microphone(&self.audio)
    }

    fn open_speaker(&self) -> Result<Arc<dyn AudioOutput>> {
        let speaker = super::audio::CpalSpeaker::open(&self.audio)?;
        Ok(Arc::new(speaker))
    }

    fn open_camera(&self) -> Result<CameraStream> {
        let source = StillFrameSource::from_config(&self.live)?;
        Ok(CameraStream {
            source: Box::new(source),
            track: MediaTrack::new(),
        })
    }
}
