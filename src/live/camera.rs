//! Camera snapshots for the one-to-one session.
//!
//! A [`FrameSource`] yields JPEG snapshots sized for the live endpoint. The
//! built-in source re-reads a still image from disk on every snapshot, so an
//! external grabber that keeps overwriting the file acts as a camera.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use tracing::debug;

use crate::config::LiveConfig;
use crate::error::{Result, StudioError};

/// MIME type of snapshots sent to the live endpoint.
pub const FRAME_MIME_TYPE: &str = "image/jpeg";

/// Produces encoded camera snapshots.
pub trait FrameSource: Send + Sync {
    /// Capture one JPEG snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if no frame is currently available.
    fn capture_jpeg(&mut self) -> Result<Vec<u8>>;
}

/// Snapshot geometry and quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// JPEG quality, 1-100.
    pub quality: u8,
}

impl FrameFormat {
    /// Format from live configuration.
    pub fn from_config(config: &LiveConfig) -> Self {
        Self {
            width: config.frame_width.max(1),
            height: config.frame_height.max(1),
            quality: config.jpeg_quality.clamp(1, 100),
        }
    }
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self::from_config(&LiveConfig::default())
    }
}

/// Scale `image` to exactly the format's size and encode it as JPEG.
///
/// # Errors
///
/// Returns [`StudioError::Video`] if encoding fails.
pub fn encode_frame(image: &DynamicImage, format: FrameFormat) -> Result<Vec<u8>> {
    let scaled = image
        .resize_exact(format.width, format.height, FilterType::Triangle)
        .to_rgb8();
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, format.quality)
        .encode_image(&scaled)
        .map_err(|e| StudioError::Video(format!("jpeg encode failed: {e}")))?;
    Ok(out.into_inner())
}

/// Reads a still image from disk on every snapshot.
#[derive(Debug, Clone)]
pub struct StillFrameSource {
    path: PathBuf,
    format: FrameFormat,
}

impl StillFrameSource {
    /// Source reading `path`.
    pub fn new(path: impl Into<PathBuf>, format: FrameFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    /// Source configured by `live.camera_path`.
    ///
    /// # Errors
    ///
    /// Returns [`StudioError::Video`] if no camera path is configured or the file is missing.
    pub fn from_config(config: &LiveConfig) -> Result<Self> {
        let path = config
            .camera_path
            .as_ref()
            .ok_or_else(|| StudioError::Video("no camera configured (live.camera_path)".into()))?;
        if !path.exists() {
            return Err(StudioError::Video(format!(
                "camera source '{}' not found",
                path.display()
            )));
        }
        Ok(Self::new(path.clone(), FrameFormat::from_config(config)))
    }

    /// The file being read.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for StillFrameSource {
    fn capture_jpeg(&mut self) -> Result<Vec<u8>> {
        let image = ImageReader::open(&self.path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|e| StudioError::Video(format!("cannot open '{}': {e}", self.path.display())))?
            .decode()
            .map_err(|e| StudioError::Video(format!("cannot decode '{}': {e}", self.path.display())))?;
        let jpeg = encode_frame(&image, self.format)?;
        debug!(bytes = jpeg.len(), "captured frame");
        Ok(jpeg)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use image::{GenericImageView, RgbImage};

    #[test]
    fn default_format_is_640_by_360_at_quality_50() {
        assert_eq!(
            FrameFormat::default(),
            FrameFormat {
                width: 640,
                height: 360,
                quality: 50
            }
        );
    }

    #[test]
    fn encode_frame_scales_to_exact_size() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 100, image::Rgb([200, 10, 10])));
        let jpeg = encode_frame(&image, FrameFormat::default()).unwrap();
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (640, 360));
    }

    #[test]
    fn still_source_reads_file_each_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        RgbImage::from_pixel(32, 18, image::Rgb([0, 0, 255])).save(&path).unwrap();

        let format = FrameFormat {
            width: 64,
            height: 36,
            quality: 50,
        };
        let mut source = StillFrameSource::new(&path, format);
        let first = source.capture_jpeg().unwrap();
        assert!(!first.is_empty());

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(source.capture_jpeg(), Err(StudioError::Video(_))));
    }

    #[test]
    fn from_config_requires_existing_path() {
        let mut config = LiveConfig::default();
        assert!(StillFrameSource::from_config(&config).is_err());
        config.camera_path = Some(PathBuf::from("/definitely/not/here.png"));
        assert!(StillFrameSource::from_config(&config).is_err());
    }
}
