//! Prompt composer shared by every chat mode.
//!
//! Collects pending text, file attachments, the selected model, the research
//! flag and an optional `@extension` tag, then packages them into a
//! [`ComposedPrompt`] on submit.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use tracing::debug;

use crate::error::{Result, StudioError};

/// Maximum pending attachments; later additions beyond this are dropped.
pub const MAX_ATTACHMENTS: usize = 10;

/// Model selected when the composer is created.
pub const DEFAULT_MODEL: &str = "gemini-flash-lite-latest";

/// A selectable chat model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelChoice {
    /// Vendor model identifier.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Short speed badge.
    pub badge: &'static str,
}

/// Models offered by the composer.
pub const MODEL_CHOICES: [ModelChoice; 3] = [
    ModelChoice {
        id: "gemini-flash-lite-latest",
        name: "Gemini Lite",
        badge: "Ultra Fast",
    },
    ModelChoice {
        id: "gemini-3-flash-preview",
        name: "Gemini 3 Flash",
        badge: "Fast",
    },
    ModelChoice {
        id: "gemini-3-pro-preview",
        name: "Gemini 3 Pro",
        badge: "Smart",
    },
];

/// An `@` extension the composer can tag a prompt with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extension {
    /// Tag inserted after `@`.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
}

/// Extensions listed by the picker.
pub const EXTENSIONS: [Extension; 4] = [
    Extension {
        id: "gmail",
        name: "Gmail",
        description: "Summarize or search emails",
    },
    Extension {
        id: "drive",
        name: "Drive",
        description: "Access your Google Drive files",
    },
    Extension {
        id: "youtube",
        name: "YouTube",
        description: "Find and analyze videos",
    },
    Extension {
        id: "docs",
        name: "Google Docs",
        description: "Edit or find documents",
    },
];

/// A file attached to a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Display name (file name).
    pub name: String,
    /// Inferred MIME type.
    pub mime_type: String,
    /// Raw file contents.
    pub data: Vec<u8>,
}

impl Attachment {
    /// Read a local file and infer its MIME type from the extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| {
            StudioError::Io(std::io::Error::new(
                e.kind(),
                format!("cannot read attachment '{}': {e}", path.display()),
            ))
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            name,
            mime_type: mime_type_for_path(path),
            data,
        })
    }

    /// Build an attachment from in-memory bytes.
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Whether this attachment is sent to the vendor as inline image data.
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// Standard base64 encoding of the contents.
    pub fn base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}

/// Infer a MIME type from a path's extension.
pub fn mime_type_for_path(path: &Path) -> String {
    if let Ok(format) = image::ImageFormat::from_path(path) {
        return format.to_mime_type().to_owned();
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "json" => "application/json",
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
    .to_owned()
}

/// Everything a panel needs to issue one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposedPrompt {
    /// Prompt text as typed.
    pub text: String,
    /// Attached files.
    pub attachments: Vec<Attachment>,
    /// Selected model identifier.
    pub model: String,
    /// Deep-research flag.
    pub research: bool,
    /// Selected `@extension` tag.
    pub extension: Option<String>,
}

impl ComposedPrompt {
    /// A text-only prompt on the default model.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: DEFAULT_MODEL.to_owned(),
            ..Self::default()
        }
    }

    /// Builder: add an attachment.
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Whether there is nothing to send.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachments.is_empty()
    }

    /// Image attachments only.
    pub fn images(&self) -> impl Iterator<Item = &Attachment> {
        self.attachments.iter().filter(|a| a.is_image())
    }
}

/// Pending composer state.
#[derive(Debug, Clone)]
pub struct Composer {
    text: String,
    attachments: Vec<Attachment>,
    model: String,
    research: bool,
    extension: Option<String>,
    picker_open: bool,
}

impl Default for Composer {
    fn default() -> Self {
        Self {
            text: String::new(),
            attachments: Vec::new(),
            model: DEFAULT_MODEL.to_owned(),
            research: false,
            extension: None,
            picker_open: false,
        }
    }
}

impl Composer {
    /// Empty composer on the default model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pending text.
    ///
    /// A trailing `@` opens the extension picker; text with no `@` at all
    /// closes it. Any other edit leaves the picker as it was.
    pub fn set_text(&mut self, text: &str) {
        text.clone_into(&mut self.text);
        if text.ends_with('@') {
            self.picker_open = true;
        } else if !text.contains('@') {
            self.picker_open = false;
        }
    }

    /// Pending text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the extension picker is showing.
    pub fn picker_open(&self) -> bool {
        self.picker_open
    }

    /// Choose an extension: the trailing `@` becomes `@{id} ` and the tag is recorded.
    pub fn select_extension(&mut self, id: &str) {
        if let Some(stripped) = self.text.strip_suffix('@') {
            self.text = format!("{stripped}@{id} ");
        }
        self.extension = Some(id.to_owned());
        self.picker_open = false;
    }

    /// Selected extension tag.
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Add attachments, keeping the first [`MAX_ATTACHMENTS`]. Returns how many were kept.
    pub fn attach(&mut self, files: impl IntoIterator<Item = Attachment>) -> usize {
        let before = self.attachments.len();
        self.attachments.extend(files);
        if self.attachments.len() > MAX_ATTACHMENTS {
            debug!(
                dropped = self.attachments.len() - MAX_ATTACHMENTS,
                "attachment cap reached"
            );
            self.attachments.truncate(MAX_ATTACHMENTS);
        }
        self.attachments.len() - before
    }

    /// Read and attach a local file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn attach_path(&mut self, path: impl Into<PathBuf>) -> Result<usize> {
        let attachment = Attachment::from_path(&path.into())?;
        Ok(self.attach([attachment]))
    }

    /// Remove the attachment at `index`.
    pub fn detach(&mut self, index: usize) -> Option<Attachment> {
        (index < self.attachments.len()).then(|| self.attachments.remove(index))
    }

    /// Pending attachments.
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Select a model by identifier.
    pub fn set_model(&mut self, model: &str) {
        model.clone_into(&mut self.model);
    }

    /// Selected model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Flip the research flag and return the new value.
    pub fn toggle_research(&mut self) -> bool {
        self.research = !self.research;
        self.research
    }

    /// Research flag.
    pub fn research(&self) -> bool {
        self.research
    }

    /// Package the pending input.
    ///
    /// Returns `None` when there is nothing to send or a request is already
    /// in flight. On success text, attachments and extension are cleared;
    /// model and research flag persist.
    pub fn submit(&mut self, in_flight: bool) -> Option<ComposedPrompt> {
        if in_flight || (self.text.trim().is_empty() && self.attachments.is_empty()) {
            return None;
        }
        self.picker_open = false;
        Some(ComposedPrompt {
            text: std::mem::take(&mut self.text),
            attachments: std::mem::take(&mut self.attachments),
            model: self.model.clone(),
            research: self.research,
            extension: self.extension.take(),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn png(name: &str) -> Attachment {
        Attachment::from_bytes(name, "image/png", vec![1, 2, 3])
    }

    #[test]
    fn trailing_at_opens_picker_and_plain_text_closes_it() {
        let mut composer = Composer::new();
        composer.set_text("summarize @");
        assert!(composer.picker_open());
        composer.set_text("summarize @gm");
        assert!(composer.picker_open());
        composer.set_text("summarize");
        assert!(!composer.picker_open());
    }

    #[test]
    fn selecting_extension_rewrites_trailing_at() {
        let mut composer = Composer::new();
        composer.set_text("check @");
        composer.select_extension("gmail");
        assert_eq!(composer.text(), "check @gmail ");
        assert_eq!(composer.extension(), Some("gmail"));
        assert!(!composer.picker_open());
    }

    #[test]
    fn attachments_are_capped_keeping_oldest() {
        let mut composer = Composer::new();
        let kept = composer.attach((0..8).map(|i| png(&format!("a{i}.png"))));
        assert_eq!(kept, 8);
        let kept = composer.attach((0..5).map(|i| png(&format!("b{i}.png"))));
        assert_eq!(kept, 2);
        assert_eq!(composer.attachments().len(), MAX_ATTACHMENTS);
        assert_eq!(composer.attachments()[0].name, "a0.png");
        assert_eq!(composer.attachments()[9].name, "b1.png");
    }

    #[test]
    fn submit_rejects_empty_and_in_flight() {
        let mut composer = Composer::new();
        composer.set_text("   ");
        assert!(composer.submit(false).is_none());
        composer.set_text("hello");
        assert!(composer.submit(true).is_none());
        assert_eq!(composer.text(), "hello");
    }

    #[test]
    fn submit_packages_and_clears() {
        let mut composer = Composer::new();
        composer.set_model("gemini-3-pro-preview");
        composer.toggle_research();
        composer.set_text("draft @");
        composer.select_extension("drive");
        composer.attach([png("shot.png")]);

        let prompt = composer.submit(false).unwrap();
        assert_eq!(prompt.text, "draft @drive ");
        assert_eq!(prompt.model, "gemini-3-pro-preview");
        assert!(prompt.research);
        assert_eq!(prompt.extension.as_deref(), Some("drive"));
        assert_eq!(prompt.attachments.len(), 1);

        assert!(composer.text().is_empty());
        assert!(composer.attachments().is_empty());
        assert!(composer.extension().is_none());
        assert_eq!(composer.model(), "gemini-3-pro-preview");
        assert!(composer.research());
    }

    #[test]
    fn attachments_alone_are_submittable() {
        let mut composer = Composer::new();
        composer.attach([png("x.png")]);
        assert!(composer.submit(false).is_some());
    }

    #[test]
    fn mime_types_from_extension() {
        assert_eq!(mime_type_for_path(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_type_for_path(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(mime_type_for_path(Path::new("a.pdf")), "application/pdf");
        assert_eq!(
            mime_type_for_path(Path::new("noext")),
            "application/octet-stream"
        );
    }

    #[test]
    fn attach_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpeg");
        std::fs::write(&path, b"\xff\xd8\xff").unwrap();
        let mut composer = Composer::new();
        assert_eq!(composer.attach_path(&path).unwrap(), 1);
        let attachment = &composer.attachments()[0];
        assert_eq!(attachment.name, "photo.jpeg");
        assert!(attachment.is_image());
        assert_eq!(attachment.base64(), "/9j/");
    }
}
