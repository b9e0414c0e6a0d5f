//! Director: long-running video generation.
//!
//! Starts a `predictLongRunning` operation, polls it until done, then
//! downloads the first generated video into the output directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::VideoConfig;
use crate::error::{Result, StudioError};
use crate::gemini::GeminiClient;
use crate::gemini::types::{VideoInstance, VideoParameters, VideoRequest};

/// Message shown when production fails.
pub const PRODUCTION_FAILED: &str =
    "Video production failed. Check your project permissions and quota.";

/// Progress stage reported while a video is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectorStatus {
    /// Before the request is sent.
    Initializing,
    /// Operation submitted.
    Submitted,
    /// Waiting for rendering; carries the local time of the poll.
    Rendering(String),
    /// Downloading the result.
    Downloading,
}

impl DirectorStatus {
    /// Status line.
    pub fn message(&self) -> String {
        match self {
            Self::Initializing => "Initializing cinematic sequence...".to_owned(),
            Self::Submitted => "Simulating physics and motion...".to_owned(),
            Self::Rendering(at) => format!("Rendering frames... {at}"),
            Self::Downloading => "Downloading production...".to_owned(),
        }
    }
}

/// Produces videos through one client.
pub struct VideoDirector {
    client: GeminiClient,
    model: String,
    config: VideoConfig,
    poll_interval: Duration,
}

impl VideoDirector {
    /// Director using `model` and the given settings.
    pub fn new(client: GeminiClient, model: impl Into<String>, config: VideoConfig) -> Self {
        let poll_interval = Duration::from_secs(config.poll_interval_secs);
        Self {
            client,
            model: model.into(),
            config,
            poll_interval,
        }
    }

    /// Override the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Output directory for finished videos.
    pub fn output_dir(&self) -> PathBuf {
        self.config
            .output_dir
            .clone()
            .unwrap_or_else(crate::studio_dirs::videos_dir)
    }

    fn request(&self, prompt: &str) -> VideoRequest {
        VideoRequest {
            instances: vec![VideoInstance {
                prompt: prompt.to_owned(),
            }],
            parameters: VideoParameters {
                sample_count: 1,
                resolution: self.config.resolution.clone(),
                aspect_ratio: self.config.aspect_ratio.clone(),
            },
        }
    }

    /// Generate a video for `prompt` and return the saved file path.
    ///
    /// `on_status` is called at each stage.
    ///
    /// # Errors
    ///
    /// Returns an error for a blank prompt, a failed operation, a finished
    /// operation without a video, or any transport or filesystem failure.
    pub async fn produce(
        &self,
        prompt: &str,
        mut on_status: impl FnMut(&DirectorStatus),
    ) -> Result<PathBuf> {
        if prompt.trim().is_empty() {
            return Err(StudioError::Video("empty prompt".to_owned()));
        }
        on_status(&DirectorStatus::Initializing);
        let mut operation = self
            .client
            .start_video_generation(&self.model, &self.request(prompt))
            .await?;
        on_status(&DirectorStatus::Submitted);

        while !operation.done {
            let at = chrono::Local::now().format("%-I:%M:%S %p").to_string();
            on_status(&DirectorStatus::Rendering(at));
            tokio::time::sleep(self.poll_interval).await;
            operation = self.client.get_operation(&operation.name).await?;
        }

        if let Some(error) = &operation.error {
            warn!(code = error.code, "video operation failed: {}", error.message);
            return Err(StudioError::Video(error.message.clone()));
        }
        let uri = operation
            .video_uri()
            .ok_or_else(|| StudioError::Video("operation finished without a video".to_owned()))?;

        on_status(&DirectorStatus::Downloading);
        let bytes = self.client.download(uri).await?;
        let path = self.save(&bytes, &operation.name)?;
        info!(path = %path.display(), bytes = bytes.len(), "video saved");
        Ok(path)
    }

    fn save(&self, bytes: &[u8], operation: &str) -> Result<PathBuf> {
        let dir = self.output_dir();
        std::fs::create_dir_all(&dir)?;
        let id = operation.rsplit('/').next().unwrap_or("video");
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let path = dir.join(format!("sarjo-{stamp}-{}.mp4", sanitize(id)));
        write_file(&path, bytes)?;
        Ok(path)
    }
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).map_err(|e| {
        StudioError::Video(format!("cannot write '{}': {e}", path.display()))
    })
}
