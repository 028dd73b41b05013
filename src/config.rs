//! Application configuration management.
//!
//! Settings are layered with figment, later layers winning:
//!
//! 1. Built-in defaults
//! 2. TOML config file (platform config dir, or an explicit path)
//! 3. `BLOBTIER_*` environment variables
//! 4. CLI flags, applied by the caller
//!
//! # Example
//!
//! ```toml
//! cache_dir = "/var/cache/myapp/blobs"
//! disk_quota_bytes = 52428800
//! memory_quota_bytes = 8388608
//! working_set_capacity = 500
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::cache::database::{IndexConfig, DEFAULT_DISK_QUOTA_BYTES};
use crate::cache::memory::DEFAULT_MEMORY_QUOTA_BYTES;
use crate::cache::working_set::DEFAULT_WORKING_SET_CAPACITY;
use crate::cache::{CacheError, CacheResult};

/// Prefix of environment variables that override config keys.
pub const ENV_PREFIX: &str = "BLOBTIER_";

/// Blobs at least this large are memory-mapped when read back.
pub const DEFAULT_MMAP_THRESHOLD_BYTES: u64 = 64 * 1024;

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory for the index and blob files. Platform cache dir when unset.
    pub cache_dir: Option<PathBuf>,
    /// Disk usage above which the least recently used blobs are swept.
    pub disk_quota_bytes: u64,
    /// Budget for payload bytes kept in memory.
    pub memory_quota_bytes: u64,
    /// Number of index rows kept in memory.
    pub working_set_capacity: usize,
    /// Size from which blobs are read through a memory map.
    pub mmap_threshold_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: None,
            disk_quota_bytes: DEFAULT_DISK_QUOTA_BYTES,
            memory_quota_bytes: DEFAULT_MEMORY_QUOTA_BYTES,
            working_set_capacity: DEFAULT_WORKING_SET_CAPACITY,
            mmap_threshold_bytes: DEFAULT_MMAP_THRESHOLD_BYTES,
        }
    }
}

impl Config {
    /// Load the configuration from the default file location and environment.
    ///
    /// A missing config file is not an error; invalid values are.
    pub fn load() -> Result<Self> {
        match Self::default_config_path() {
            Some(path) => Self::load_from_path(&path),
            None => Self::figment(None).extract().context("Invalid configuration"),
        }
    }

    /// Load the configuration using `path` as the config file.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        log::debug!("Loading configuration from {}", path.display());
        Self::figment(Some(path))
            .extract()
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Platform-specific config file path (e.g. `~/.config/blobtier/config.toml`).
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Directory the cache lives in.
    pub fn storage_dir(&self) -> CacheResult<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => project_dirs()
                .map(|dirs| dirs.cache_dir().to_path_buf())
                .ok_or(CacheError::NoCacheDir),
        }
    }

    /// Settings for the persistent index.
    /// Index tunables derived from this configuration.
    #[must_use]
    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            disk_quota_bytes: self.disk_quota_bytes,
            working_set_capacity: self.working_set_capacity,
        }
    }

    /// Set the storage directory.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Set the disk quota in bytes.
    #[must_use]
    pub fn with_disk_quota(mut self, bytes: u64) -> Self {
        self.disk_quota_bytes = bytes;
        self
    }

    /// Set the memory budget in bytes.
    #[must_use]
    pub fn with_memory_quota(mut self, bytes: u64) -> Self {
        self.memory_quota_bytes = bytes;
        self
    }

    /// Set the working set capacity (at least 1).
    #[must_use]
    pub fn with_working_set_capacity(mut self, capacity: usize) -> Self {
        self.working_set_capacity = capacity.max(1);
        self
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "blobtier", "blobtier")
}
