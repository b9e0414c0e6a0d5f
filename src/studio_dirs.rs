//! Centralized application directory paths for Sarjo Studio.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | App data | `~/Library/Application Support/sarjo/` | `~/.local/share/sarjo/` |
//! | Config | `~/Library/Application Support/sarjo/` | `~/.config/sarjo/` |
//! | Cache | `~/Library/Caches/sarjo/` | `~/.cache/sarjo/` |
//!
//! # Environment Overrides
//!
//! - `SARJO_DATA_DIR` overrides [`data_dir`]
//! - `SARJO_CONFIG_DIR` overrides [`config_dir`]
//! - `SARJO_CACHE_DIR` overrides [`cache_dir`]

use std::path::PathBuf;

/// File name of the persisted neural vault.
pub const VAULT_FILE_NAME: &str = "sarjo_studio_vault.json";

/// Application data root directory.
///
/// Holds the neural vault, logs, and downloaded videos.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("SARJO_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("sarjo"))
        .unwrap_or_else(|| PathBuf::from("/tmp/sarjo-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("SARJO_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("sarjo"))
        .unwrap_or_else(|| PathBuf::from("/tmp/sarjo-config"))
}

/// Application cache directory.
#[must_use]
pub fn cache_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("SARJO_CACHE_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::cache_dir()
        .map(|d| d.join("sarjo"))
        .unwrap_or_else(|| PathBuf::from("/tmp/sarjo-cache"))
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Generated video directory (`data_dir()/videos/`).
#[must_use]
pub fn videos_dir() -> PathBuf {
    data_dir().join("videos")
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Neural vault file path (`data_dir()/sarjo_studio_vault.json`).
#[must_use]
pub fn vault_file() -> PathBuf {
    data_dir().join(VAULT_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_is_nonempty() {
        let dir = data_dir();
        assert!(!dir.as_os_str().is_empty());
    }

    #[test]
    fn config_file_ends_with_config_toml() {
        let path = config_file();
        let s = path.to_string_lossy();
        assert!(s.ends_with("config.toml"), "config_file: {s}");
    }

    #[test]
    fn vault_file_uses_vault_name() {
        let path = vault_file();
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some(VAULT_FILE_NAME)
        );
    }

    #[test]
    fn logs_and_videos_live_under_data_dir() {
        let data = data_dir();
        assert!(logs_dir().starts_with(&data));
        assert!(videos_dir().starts_with(&data));
    }
}
