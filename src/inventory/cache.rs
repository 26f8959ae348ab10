//! Time-boxed inventory cache
//!
//! A single JSON file holding the most recent login and device list together
//! with the time it was captured. Entries older than the TTL are ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::DeviceRecord;
use crate::error::Result;

use super::{Account, Credential};

/// Default cache lifetime
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Contents of the cache file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedInventory {
    /// Unix timestamp (seconds) when this entry was captured
    pub captured_at: i64,
    /// Session token
    pub credential: Credential,
    /// Account metadata
    pub account: Account,
    /// Raw device list
    pub devices: Vec<DeviceRecord>,
}

impl CachedInventory {
    /// Capture a fresh entry now
    pub fn new(credential: Credential, account: Account, devices: Vec<DeviceRecord>) -> Self {
        Self {
            captured_at: chrono::Utc::now().timestamp(),
            credential,
            account,
            devices,
        }
    }

    /// Age in seconds relative to `now`
    pub fn age_secs(&self, now: i64) -> i64 {
        now - self.captured_at
    }

    /// Whether the entry is still valid at `now`
    ///
    /// Entries captured in the future (clock moved backwards) are treated as
    /// expired.
    pub fn is_fresh(&self, now: i64, ttl: Duration) -> bool {
        let age = self.age_secs(now);
        age >= 0 && (age as u64) < ttl.as_secs()
    }
}

/// Inventory cache backed by a single file
#[derive(Debug, Clone)]
pub struct InventoryCache {
    path: PathBuf,
    ttl: Duration,
}

impl InventoryCache {
    /// Create a cache at `path` with the given TTL
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
        }
    }

    /// Cache file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cache TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Load the cached entry if present and fresh
    pub async fn load(&self) -> Option<CachedInventory> {
        self.load_at(chrono::Utc::now().timestamp()).await
    }

    /// Load the cached entry, judging freshness against `now`
    pub async fn load_at(&self, now: i64) -> Option<CachedInventory> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "Failed to read inventory cache");
                return None;
            }
        };

        let entry: CachedInventory = match serde_json::from_slice(&data) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "Corrupt inventory cache");
                return None;
            }
        };

        if !entry.is_fresh(now, self.ttl) {
            tracing::debug!(
                age_secs = entry.age_secs(now),
                ttl_secs = self.ttl.as_secs(),
                "Inventory cache expired"
            );
            return None;
        }

        Some(entry)
    }

    /// Replace the cached entry
    ///
    /// Written to a temporary file first and renamed into place so a reader
    /// never sees a partial file. The file holds session tokens and is only
    /// readable by its owner.
    pub async fn store(&self, entry: &CachedInventory) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let data = serde_json::to_vec_pretty(entry)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, data).await?;
        restrict_to_owner(&tmp).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(path = %self.path.display(), devices = entry.devices.len(), "Inventory cached");
        Ok(())
    }

    /// Remove the cached entry
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
async fn restrict_to_owner(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_to_owner(_path: &Path) -> Result<()> {
    Ok(())
}
