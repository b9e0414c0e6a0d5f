//! Error types for the studio.

/// Top-level error type for Sarjo Studio.
#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Camera / frame source error.
    #[error("video error: {0}")]
    Video(String),

    /// Vendor API request or response error.
    #[error("vendor error: {0}")]
    Vendor(String),

    /// Vendor rejected the credentials.
    #[error("auth error: {0}")]
    Auth(String),

    /// Live session link error (connect, protocol, closed).
    #[error("live session error: {0}")]
    Live(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Neural vault storage error.
    #[error("vault error: {0}")]
    Vault(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// The owning session was stopped before the operation completed.
    #[error("operation cancelled")]
    Cancelled,
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, StudioError>;
