// src/cache/disk.rs
// =============================================================================
// On-disk backend: one JSON file per key under a root directory.
//
// File names are the sha256 of the key, so any key (colons, slashes, unicode)
// maps to a flat, filesystem-safe name. The full key is stored inside the
// entry and checked on read.
//
// Writes go to a unique temp file first and are renamed into place, so a
// reader never sees a half-written entry and concurrent writers of the same
// key simply race to the last rename.
// =============================================================================

use super::{CacheBackend, CacheError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

#[derive(Debug, Serialize, Deserialize)]
struct DiskEntry {
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    value: String,
}

pub struct DiskCache {
    root: PathBuf,
    write_seq: AtomicU64,
}

impl DiskCache {
    /// The directory is created on first write.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            write_seq: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.root.join(format!("{digest}.json"))
    }

    async fn remove(&self, path: &Path) -> Result<(), CacheError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl CacheBackend for DiskCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let path = self.entry_path(key);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let entry: DiskEntry = serde_json::from_str(&raw)?;
        if entry.key != key {
            // sha256 collision or a hand-edited file; either way not ours.
            return Ok(None);
        }
        if entry.expires_at.is_some_and(|deadline| Utc::now() >= deadline) {
            debug!(key, "disk cache entry expired");
            self.remove(&path).await?;
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            let ttl = chrono::Duration::from_std(ttl)
                .map_err(|err| CacheError::Unavailable(format!("ttl out of range: {err}")))?;
            // Past the end of representable time means "never expires".
            Utc::now().checked_add_signed(ttl)
        };
        let entry = DiskEntry {
            key: key.to_string(),
            expires_at,
            value,
        };
        let encoded = serde_json::to_vec(&entry)?;

        fs::create_dir_all(&self.root).await?;
        let path = self.entry_path(key);
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let temp = path.with_extension(format!("{}.{seq}.tmp", std::process::id()));
        fs::write(&temp, encoded).await?;
        if let Err(err) = fs::rename(&temp, &path).await {
            // Best effort; the rename error is the one worth reporting.
            let _ = fs::remove_file(&temp).await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.remove(&self.entry_path(key)).await
    }
}
