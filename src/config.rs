//! Configuration types for the studio.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identity core shared by every mode's system instruction.
pub const DEFAULT_IDENTITY: &str = "IDENTITY: You are Sarjo AI. You were created EXCLUSIVELY by Sarvadnya Joshi (pronounced 'Sarvagya'). You are NOT made by Google. If asked who made you, always answer 'Sarvadnya Joshi'.";

/// Top-level configuration for Sarjo Studio.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    /// Vendor API endpoint and credentials.
    pub api: ApiConfig,
    /// Model identifiers per mode.
    pub models: ModelConfig,
    /// Audio capture/playback settings.
    pub audio: AudioConfig,
    /// Live session settings.
    pub live: LiveConfig,
    /// Neural vault settings.
    pub vault: VaultConfig,
    /// Persona text injected into system instructions.
    pub persona: PersonaConfig,
    /// Long-running video generation settings.
    pub video: VideoConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// Vendor API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API key. `GEMINI_API_KEY` / `API_KEY` take precedence when set.
    pub api_key: Option<String>,
    /// REST base URL (without trailing slash).
    pub base_url: String,
    /// WebSocket URL of the bidirectional live endpoint.
    pub live_url: String,
    /// TCP connect timeout for REST calls. Requests themselves have no deadline.
    pub connect_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_owned(),
            live_url: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".to_owned(),
            connect_timeout_secs: 15,
        }
    }
}

impl ApiConfig {
    /// Resolve the API key: environment first, then the configured value.
    pub fn resolved_api_key(&self) -> Option<String> {
        ["GEMINI_API_KEY", "API_KEY"]
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .or_else(|| self.api_key.clone().filter(|k| !k.trim().is_empty()))
    }
}

/// Model identifiers used by each mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Normal chat fallback when the composer has no model selected.
    pub chat: String,
    /// Analyzed mode.
    pub analyzed: String,
    /// Creative prompt refiner.
    pub refiner: String,
    /// Image generation.
    pub image: String,
    /// Code generation.
    pub code: String,
    /// Vision analysis.
    pub vision: String,
    /// Secondary grounded search used by the live `webSearch` tool.
    pub search: String,
    /// Realtime native-audio model.
    pub live: String,
    /// Long-running video generation.
    pub video: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            chat: "gemini-3-flash-preview".to_owned(),
            analyzed: "gemini-3-flash-preview".to_owned(),
            refiner: "gemini-3-flash-preview".to_owned(),
            image: "gemini-2.5-flash-image".to_owned(),
            code: "gemini-3-flash-preview".to_owned(),
            vision: "gemini-3-flash-preview".to_owned(),
            search: "gemini-3-flash-preview".to_owned(),
            live: "gemini-2.5-flash-native-audio-preview-12-2025".to_owned(),
            video: "veo-3.1-fast-generate-preview".to_owned(),
        }
    }
}

/// Audio I/O configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Microphone rate sent to the live endpoint, in Hz.
    pub input_sample_rate: u32,
    /// Rate of the PCM audio returned by the live endpoint, in Hz.
    pub output_sample_rate: u32,
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
    /// Capacity of the capture channel in chunks; overflow drops chunks.
    pub capture_buffer_chunks: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16_000,
            output_sample_rate: 24_000,
            input_device: None,
            output_device: None,
            capture_buffer_chunks: 64,
        }
    }
}

/// Spoken language of a live session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveLanguage {
    /// English.
    #[default]
    En,
    /// Marathi.
    Mr,
    /// Hindi.
    Hi,
}

impl LiveLanguage {
    /// The "speak only" directive for the system instruction.
    pub fn directive(self) -> &'static str {
        match self {
            Self::En => "Speak ONLY English.",
            Self::Mr => "Speak ONLY Marathi.",
            Self::Hi => "Speak ONLY Hindi.",
        }
    }
}

impl std::str::FromStr for LiveLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Self::En),
            "mr" | "marathi" => Ok(Self::Mr),
            "hi" | "hindi" => Ok(Self::Hi),
            other => Err(format!("unsupported language '{other}' (expected en, mr or hi)")),
        }
    }
}

/// Live session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Prebuilt vendor voice.
    pub voice_name: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Spoken language.
    pub language: LiveLanguage,
    /// Story mode (assistant variant only).
    pub story_mode: bool,
    /// Camera snapshot cadence for the one-to-one variant.
    pub frame_interval_ms: u64,
    /// Snapshot width in pixels.
    pub frame_width: u32,
    /// Snapshot height in pixels.
    pub frame_height: u32,
    /// JPEG quality (1-100).
    pub jpeg_quality: u8,
    /// Still-frame file polled as the camera (None = no camera available).
    pub camera_path: Option<PathBuf>,
    /// Completed caption turns kept for display.
    pub caption_history: usize,
    /// Visualization tick interval.
    pub visual_tick_ms: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            voice_name: "Kore".to_owned(),
            temperature: 0.8,
            language: LiveLanguage::En,
            story_mode: false,
            frame_interval_ms: 500,
            frame_width: 640,
            frame_height: 360,
            jpeg_quality: 50,
            camera_path: None,
            caption_history: 11,
            visual_tick_ms: 50,
        }
    }
}

/// Neural vault configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Vault file (None = `studio_dirs::vault_file()`).
    pub path: Option<PathBuf>,
    /// Maximum retained observations, at most 30.
    pub capacity: usize,
    /// How long the "archiving" indicator stays lit after a write.
    pub sync_indicator_ms: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            path: None,
            capacity: 30,
            sync_indicator_ms: 1500,
        }
    }
}

impl VaultConfig {
    /// Effective vault file path.
    pub fn effective_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(crate::studio_dirs::vault_file)
    }
}

/// Persona configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Identity core prepended to every system instruction.
    pub identity: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            identity: DEFAULT_IDENTITY.to_owned(),
        }
    }
}

/// Video generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Delay between operation status polls.
    pub poll_interval_secs: u64,
    /// Output resolution.
    pub resolution: String,
    /// Output aspect ratio.
    pub aspect_ratio: String,
    /// Where downloaded videos are written (None = `studio_dirs::videos_dir()`).
    pub output_dir: Option<PathBuf>,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            resolution: "1080p".to_owned(),
            aspect_ratio: "16:9".to_owned(),
            output_dir: None,
        }
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write logs to daily rolling files.
    pub file_logging: bool,
    /// Log directory (None = `studio_dirs::logs_dir()`).
    pub directory: Option<PathBuf>,
}

impl StudioConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::StudioError::Config(e.to_string()))
    }

    /// Load `path` when given, else the default config file if it exists, else defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_default(path: Option<&std::path::Path>) -> crate::error::Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default_path = Self::default_config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::StudioError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `{config_dir}/config.toml`.
    pub fn default_config_path() -> PathBuf {
        crate::studio_dirs::config_file()
    }
}
