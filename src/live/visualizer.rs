//! Observable session snapshots and level meters.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use super::state::{Caption, SessionState, Speaker};

/// A level shared between a forwarder task and the session.
#[derive(Debug, Clone, Default)]
pub struct LevelMeter(Arc<AtomicU32>);

impl LevelMeter {
    /// Meter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a level, clamped to `0.0..=1.0`.
    pub fn set(&self, level: f32) {
        let level = if level.is_finite() { level.clamp(0.0, 1.0) } else { 0.0 };
        self.0.store(level.to_bits(), Ordering::Relaxed);
    }

    /// Last stored level.
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Everything a renderer needs to draw a live session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveSnapshot {
    /// Lifecycle state.
    pub state: SessionState,
    /// Status label.
    pub status: String,
    /// Failure label of the last session that ended in error.
    pub last_error: Option<String>,
    /// Caption being spoken.
    pub caption: Option<Caption>,
    /// Finished captions, oldest first.
    pub history: Vec<Caption>,
    /// Model audio is playing.
    pub speaking: bool,
    /// A vault write happened recently.
    pub syncing: bool,
    /// Microphone intensity, 0..1.
    pub input_level: f32,
    /// Speaker intensity, 0..1.
    pub output_level: f32,
    /// Image on display, as a data URL.
    pub image: Option<String>,
}

impl LiveSnapshot {
    /// One-line terminal rendering: status, meters, indicators, caption.
    pub fn render_line(&self, meter_width: usize) -> String {
        let mut line = format!(
            "[{}] in {} out {}",
            self.status,
            bar(self.input_level, meter_width),
            bar(self.output_level, meter_width)
        );
        if self.speaking {
            line.push_str(" SPEAKING");
        }
        if self.syncing {
            line.push_str(" ARCHIVING");
        }
        if self.image.is_some() {
            line.push_str(" [image]");
        }
        if let Some(caption) = &self.caption {
            let who = match caption.speaker {
                Speaker::User => "You",
                Speaker::Model => "Sarjo",
            };
            line.push_str(&format!(" | {who}: {}", caption.text));
        }
        line
    }
}

/// A fixed-width bar for `level`.
pub fn bar(level: f32, width: usize) -> String {
    let filled = ((level.clamp(0.0, 1.0) * width as f32).round() as usize).min(width);
    format!("{}{}", "#".repeat(filled), ".".repeat(width - filled))
}
