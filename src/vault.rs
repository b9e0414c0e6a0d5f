//! Neural vault: a capped, persisted log of observations about the user.
//!
//! Live sessions append to the vault through the `archiveNeuralData` tool
//! and read it back to build the system instruction of the next session.
//! The on-disk form is a JSON array of `{ "timestamp", "data" }` objects,
//! newest last, never longer than the configured capacity.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, StudioError};
use crate::transcript::now_epoch_millis;

/// Default number of retained observations.
pub const DEFAULT_VAULT_CAPACITY: usize = 30;

/// One archived observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEntry {
    /// Archive time, Unix epoch milliseconds.
    pub timestamp: u64,
    /// Free-text observation.
    pub data: String,
}

/// File-backed rolling log of [`VaultEntry`] values.
#[derive(Debug, Clone)]
pub struct NeuralVault {
    path: PathBuf,
    capacity: usize,
}

impl NeuralVault {
    /// Open a vault at `path` retaining at most `capacity` entries.
    ///
    /// `capacity` is clamped to `1..=DEFAULT_VAULT_CAPACITY`. The file is not
    /// touched until the first read or write.
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity: capacity.clamp(1, DEFAULT_VAULT_CAPACITY),
        }
    }

    /// Vault described by the configuration.
    pub fn from_config(config: &crate::config::VaultConfig) -> Self {
        Self::new(config.effective_path(), config.capacity)
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Maximum retained entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Read the newest `capacity` entries, oldest first.
    ///
    /// A missing file is an empty vault. A corrupt file is logged and also
    /// treated as empty so that the next write replaces it.
    ///
    /// # Errors
    ///
    /// Returns an error only when the file exists but cannot be read.
    pub fn load(&self) -> Result<Vec<VaultEntry>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StudioError::Io(e)),
        };
        match serde_json::from_slice::<Vec<VaultEntry>>(&bytes) {
            Ok(mut entries) => {
                evict_oldest(&mut entries, self.capacity);
                Ok(entries)
            }
            Err(e) => {
                warn!(path = %self.path.display(), "vault file unreadable, starting empty: {e}");
                Ok(Vec::new())
            }
        }
    }

    /// Append an observation, evicting the oldest entries beyond capacity.
    ///
    /// Returns the entry that was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault cannot be read or written.
    pub fn append(&self, data: &str) -> Result<VaultEntry> {
        let entry = VaultEntry {
            timestamp: now_epoch_millis(),
            data: data.to_owned(),
        };
        let mut entries = self.load()?;
        entries.push(entry.clone());
        let evicted = evict_oldest(&mut entries, self.capacity);
        self.write_atomic(&entries)?;
        debug!(len = entries.len(), evicted, "vault entry archived");
        Ok(entry)
    }

    /// Remove every entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault file cannot be written.
    pub fn clear(&self) -> Result<()> {
        self.write_atomic(&[])
    }

    /// One-line summary of the stored observations, `None` when empty.
    ///
    /// Observations are joined with `"; "` oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault cannot be read.
    pub fn summary(&self) -> Result<Option<String>> {
        let entries = self.load()?;
        if entries.is_empty() {
            return Ok(None);
        }
        let joined = entries
            .iter()
            .map(|e| e.data.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Ok(Some(joined))
    }

    /// Write entries via temp file, fsync and rename.
    fn write_atomic(&self, entries: &[VaultEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(entries)?;
        let tmp_path = self.path.with_extension("json.tmp");

        let mut file = std::fs::File::create(&tmp_path).map_err(|e| {
            StudioError::Vault(format!(
                "failed to create temp file '{}': {e}",
                tmp_path.display()
            ))
        })?;
        file.write_all(&json)
            .map_err(|e| StudioError::Vault(format!("failed to write temp file: {e}")))?;
        file.sync_all()
            .map_err(|e| StudioError::Vault(format!("failed to sync temp file: {e}")))?;

        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            StudioError::Vault(format!(
                "failed to rename '{}' to '{}': {e}",
                tmp_path.display(),
                self.path.display()
            ))
        })
    }
}

/// Drop the oldest entries so that at most `capacity` remain. Returns how many were dropped.
fn evict_oldest(entries: &mut Vec<VaultEntry>, capacity: usize) -> usize {
    let excess = entries.len().saturating_sub(capacity);
    if excess > 0 {
        entries.drain(..excess);
    }
    excess
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn temp_vault(capacity: usize) -> (tempfile::TempDir, NeuralVault) {
        let dir = tempfile::tempdir().unwrap();
        let vault = NeuralVault::new(dir.path().join("vault.json"), capacity);
        (dir, vault)
    }

    #[test]
    fn missing_file_is_empty() {
        let (_dir, vault) = temp_vault(DEFAULT_VAULT_CAPACITY);
        assert!(vault.load().unwrap().is_empty());
        assert_eq!(vault.summary().unwrap(), None);
    }

    #[test]
    fn append_persists_in_order() {
        let (_dir, vault) = temp_vault(DEFAULT_VAULT_CAPACITY);
        vault.append("wears glasses").unwrap();
        vault.append("likes chess").unwrap();

        let reopened = NeuralVault::new(vault.path(), DEFAULT_VAULT_CAPACITY);
        let entries = reopened.load().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].data, "wears glasses");
        assert_eq!(entries[1].data, "likes chess");
        assert_eq!(
            reopened.summary().unwrap().as_deref(),
            Some("wears glasses; likes chess")
        );
    }

    #[test]
    fn thirty_first_append_evicts_oldest() {
        let (_dir, vault) = temp_vault(DEFAULT_VAULT_CAPACITY);
        for i in 0..31 {
            vault.append(&format!("fact {i}")).unwrap();
        }
        let entries = vault.load().unwrap();
        assert_eq!(entries.len(), 30);
        assert_eq!(entries[0].data, "fact 1");
        assert_eq!(entries[29].data, "fact 30");
    }

    #[test]
    fn capacity_never_exceeds_thirty() {
        let (_dir, vault) = temp_vault(100);
        assert_eq!(vault.capacity(), DEFAULT_VAULT_CAPACITY);
        for i in 0..40 {
            vault.append(&format!("fact {i}")).unwrap();
        }
        let entries = vault.load().unwrap();
        assert_eq!(entries.len(), DEFAULT_VAULT_CAPACITY);
        assert_eq!(entries[0].data, "fact 10");

        let (_dir, tiny) = temp_vault(0);
        assert_eq!(tiny.capacity(), 1);
    }

    #[test]
    fn oversized_file_loads_newest_entries() {
        let (_dir, vault) = temp_vault(DEFAULT_VAULT_CAPACITY);
        let entries: Vec<VaultEntry> = (0..45)
            .map(|i| VaultEntry {
                timestamp: i,
                data: format!("fact {i}"),
            })
            .collect();
        std::fs::write(vault.path(), serde_json::to_vec(&entries).unwrap()).unwrap();

        let loaded = vault.load().unwrap();
        assert_eq!(loaded.len(), DEFAULT_VAULT_CAPACITY);
        assert_eq!(loaded[0].data, "fact 15");
        assert_eq!(loaded[29].data, "fact 44");
    }

    #[test]
    fn corrupt_file_reads_as_empty_and_is_replaced() {
        let (_dir, vault) = temp_vault(DEFAULT_VAULT_CAPACITY);
        std::fs::write(vault.path(), "{not json").unwrap();
        assert!(vault.load().unwrap().is_empty());
        vault.append("fresh").unwrap();
        assert_eq!(vault.load().unwrap().len(), 1);
    }

    #[test]
    fn clear_empties_the_vault() {
        let (_dir, vault) = temp_vault(DEFAULT_VAULT_CAPACITY);
        vault.append("a").unwrap();
        vault.clear().unwrap();
        assert!(vault.load().unwrap().is_empty());
    }

    #[test]
    fn on_disk_format_is_timestamp_and_data() {
        let (_dir, vault) = temp_vault(DEFAULT_VAULT_CAPACITY);
        vault.append("voice is deep").unwrap();
        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(vault.path()).unwrap()).unwrap();
        let first = &raw[0];
        assert!(first["timestamp"].as_u64().unwrap() > 0);
        assert_eq!(first["data"], "voice is deep");
    }

    #[test]
    fn evict_oldest_keeps_tail() {
        let mut entries: Vec<VaultEntry> = (0..5)
            .map(|i| VaultEntry {
                timestamp: i,
                data: i.to_string(),
            })
            .collect();
        assert_eq!(evict_oldest(&mut entries, 3), 2);
        assert_eq!(entries[0].data, "2");
    }
}
