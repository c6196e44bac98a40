//! Pin persistence.
//!
//! Pinned keys survive restarts through a small JSON document:
//!
//! ```json
//! { "version": 1, "pins": ["Game Net", "Render"] }
//! ```
//!
//! Writes go to a sibling temp file that is then renamed over the target,
//! so a crash never leaves a half-written pin file behind. A save whose
//! serialized content hashes the same as the last load or save is skipped.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Current on-disk format version.
pub const PIN_FILE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PinFile {
    version: u32,
    pins: Vec<String>,
}

/// Loads and saves the pinned-key set.
#[derive(Debug)]
pub struct PinStore {
    path: PathBuf,
    last_hash: Option<u64>,
}

impl PinStore {
    /// Create a store backed by `path`. Nothing is read until [`PinStore::load`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_hash: None,
        }
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the pin set.
    ///
    /// A missing file yields an empty set. An unreadable, corrupt or
    /// unsupported-version file is logged and also yields an empty set.
    pub async fn load(&mut self) -> Vec<String> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no pin file, starting with no pins");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read pin file");
                return Vec::new();
            }
        };

        let file: PinFile = match serde_json::from_slice(&content) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "corrupt pin file, ignoring");
                return Vec::new();
            }
        };
        if file.version != PIN_FILE_VERSION {
            tracing::warn!(
                path = %self.path.display(),
                version = file.version,
                "unsupported pin file version, ignoring"
            );
            return Vec::new();
        }

        let mut pins = file.pins;
        pins.sort();
        pins.dedup();
        if let Ok(bytes) = encode(&pins) {
            self.last_hash = Some(fnv1a(&bytes));
        }
        tracing::info!(path = %self.path.display(), count = pins.len(), "pins loaded");
        pins
    }

    /// Save the pin set. Returns `false` when the content was unchanged and
    /// nothing was written.
    pub async fn save(&mut self, pins: &[String]) -> Result<bool> {
        let mut pins = pins.to_vec();
        pins.sort();
        pins.dedup();
        let bytes = encode(&pins)?;
        let hash = fnv1a(&bytes);
        if self.last_hash == Some(hash) {
            tracing::trace!(path = %self.path.display(), "pins unchanged, skipping write");
            return Ok(false);
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let tmp = temp_path(&self.path);
        tokio::fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("failed to replace {}", self.path.display()));
        }

        self.last_hash = Some(hash);
        tracing::debug!(path = %self.path.display(), count = pins.len(), "pins saved");
        Ok(true)
    }
}

fn encode(pins: &[String]) -> Result<Vec<u8>> {
    let file = PinFile {
        version: PIN_FILE_VERSION,
        pins: pins.to_vec(),
    };
    serde_json::to_vec_pretty(&file).context("failed to serialize pins")
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// 64-bit FNV-1a.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pins(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| (*k).to_owned()).collect()
    }

    #[test]
    fn test_fnv1a_known_vectors() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PinStore::new(dir.path().join("pins.json"));
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        // Given: A store in a directory that does not exist yet
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("pins.json");
        let mut store = PinStore::new(&path);

        // When: Saving pins out of order with a duplicate
        let written = store.save(&pins(&["Net", "Audio", "Net"])).await.unwrap();

        // Then: The file holds the sorted set and no temp file remains
        assert!(written);
        assert!(!temp_path(&path).exists());
        let mut fresh = PinStore::new(&path);
        assert_eq!(fresh.load().await, pins(&["Audio", "Net"]));

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
    }

    #[tokio::test]
    async fn test_unchanged_pins_skip_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pins.json");
        let mut store = PinStore::new(&path);

        assert!(store.save(&pins(&["A"])).await.unwrap());
        assert!(!store.save(&pins(&["A"])).await.unwrap());
        assert!(store.save(&pins(&["A", "B"])).await.unwrap());

        // A load primes the hash as well
        let mut reloaded = PinStore::new(&path);
        reloaded.load().await;
        assert!(!reloaded.save(&pins(&["B", "A"])).await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pins.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let mut store = PinStore::new(&path);
        assert!(store.load().await.is_empty());

        // The next save overwrites the corrupt file
        assert!(store.save(&pins(&["X"])).await.unwrap());
        assert_eq!(PinStore::new(&path).load().await, pins(&["X"]));
    }

    #[tokio::test]
    async fn test_unknown_version_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pins.json");
        std::fs::write(&path, br#"{"version": 2, "pins": ["A"]}"#).unwrap();
        assert!(PinStore::new(&path).load().await.is_empty());
    }
}
