//! Store configuration via `termstore.toml`
//!
//! On first open a commented default `termstore.toml` is created in the
//! store directory. To change settings, edit the file and reopen.

use serde::{Deserialize, Serialize};
use std::path::Path;
use termstore_core::{Error, Result};
use termstore_storage::{SpineLayout, DEFAULT_MAX_SPINE_GAP, DEFAULT_SPINE_SIZE};

/// Config file name placed in the store directory.
pub const CONFIG_FILE_NAME: &str = "termstore.toml";

/// Store configuration loaded from `termstore.toml`.
///
/// # Example
///
/// ```toml
/// spine_size = 10240
/// max_spine_gap = 64
/// flush_on_close = true
/// latest_cache_capacity = 65536
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Slots per spine. Changing it on an existing store makes its spine
    /// files unreadable.
    #[serde(default = "default_spine_size")]
    pub spine_size: u32,
    /// How many spines past the high-water mark a write may create.
    #[serde(default = "default_max_spine_gap")]
    pub max_spine_gap: u32,
    /// Flush everything when the store is closed or dropped.
    #[serde(default = "default_flush_on_close")]
    pub flush_on_close: bool,
    /// Cached latest-version results before the cache is cleared.
    #[serde(default = "default_latest_cache_capacity")]
    pub latest_cache_capacity: usize,
}

fn default_spine_size() -> u32 {
    DEFAULT_SPINE_SIZE
}

fn default_max_spine_gap() -> u32 {
    DEFAULT_MAX_SPINE_GAP
}

fn default_flush_on_close() -> bool {
    true
}

fn default_latest_cache_capacity() -> usize {
    65_536
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            spine_size: default_spine_size(),
            max_spine_gap: default_max_spine_gap(),
            flush_on_close: default_flush_on_close(),
            latest_cache_capacity: default_latest_cache_capacity(),
        }
    }
}

impl StoreConfig {
    /// Check every value.
    ///
    /// # Errors
    ///
    /// `Error::Config` for a zero spine size or gap.
    pub fn validate(&self) -> Result<()> {
        self.spine_layout().map(|_| ())
    }

    /// Spine geometry for every spined map in the store.
    pub fn spine_layout(&self) -> Result<SpineLayout> {
        SpineLayout::new(self.spine_size, self.max_spine_gap)
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# termstore configuration
#
# Slots per spine. Fixed for the life of a store: spine files written with
# one size cannot be read with another.
spine_size = 10240

# A write may create a spine at most this many spines past the highest one
# already in use. Larger jumps fail instead of allocating a sparse store.
max_spine_gap = 64

# Flush spines and identifiers when the store is closed or dropped.
flush_on_close = true

# Latest-version results kept before the cache is cleared (0 disables it).
latest_cache_capacity = 65536
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: StoreConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
