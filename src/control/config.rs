//! Control plane configuration
//!
//! Values come from three layers, highest first: `initialize` params, the
//! process environment, then defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::inventory::cache::DEFAULT_CACHE_TTL;
use crate::native::platform::DEFAULT_BINARY_BASE_URL;
use crate::registry::RegistryConfig;

/// Overrides the base media port
pub const ENV_BASE_PORT: &str = "CAMERA_BRIDGE_BASE_PORT";
/// Overrides the platform binary directory
pub const ENV_LIB_DIR: &str = "CAMERA_BRIDGE_LIB_DIR";
/// Overrides the inventory cache TTL, in seconds
pub const ENV_CACHE_TTL_SECS: &str = "CAMERA_BRIDGE_CACHE_TTL_SECS";

fn state_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("camera-bridge")
}

/// Control plane configuration
#[derive(Debug, Clone)]
pub struct PlaneConfig {
    /// Directory holding the platform binary
    pub lib_dir: PathBuf,

    /// Where the platform binary is downloaded from
    pub binary_base_url: String,

    /// Inventory cache file; `None` disables caching
    pub cache_path: Option<PathBuf>,

    /// Inventory cache TTL
    pub cache_ttl: Duration,

    /// Port allocation, stream URLs and per-bridge settings
    pub registry: RegistryConfig,
}

impl Default for PlaneConfig {
    fn default() -> Self {
        let dir = state_dir();
        Self {
            lib_dir: dir.join("lib"),
            binary_base_url: DEFAULT_BINARY_BASE_URL.to_string(),
            cache_path: Some(dir.join("inventory.json")),
            cache_ttl: DEFAULT_CACHE_TTL,
            registry: RegistryConfig::default(),
        }
    }
}

impl PlaneConfig {
    /// Set the platform binary directory
    pub fn lib_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lib_dir = dir.into();
        self
    }

    /// Set the platform binary download URL
    pub fn binary_base_url(mut self, url: impl Into<String>) -> Self {
        self.binary_base_url = url.into();
        self
    }

    /// Set or disable the inventory cache file
    pub fn cache_path(mut self, path: Option<PathBuf>) -> Self {
        self.cache_path = path;
        self
    }

    /// Set the inventory cache TTL
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the registry configuration
    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    /// Apply overrides from the process environment
    pub fn with_env(self) -> Result<Self> {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`
    pub fn with_env_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_BASE_PORT) {
            let port = value
                .trim()
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("{} must be a port number", ENV_BASE_PORT)))?;
            self.registry.base_port = port;
            self.registry.validate()?;
        }

        if let Some(value) = lookup(ENV_LIB_DIR) {
            if !value.trim().is_empty() {
                self.lib_dir = PathBuf::from(value.trim());
            }
        }

        if let Some(value) = lookup(ENV_CACHE_TTL_SECS) {
            let secs = value.trim().parse::<u64>().map_err(|_| {
                Error::Config(format!("{} must be a number of seconds", ENV_CACHE_TTL_SECS))
            })?;
            self.cache_ttl = Duration::from_secs(secs);
        }

        Ok(self)
    }
}
