//! Catalog configuration via `vecmeta.toml`
//!
//! On first open, a default `vecmeta.toml` is created in the data directory.
//! To change settings, edit the file and reopen the catalog.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use vecmeta_core::{MetaError, Result};
use vecmeta_durability::DurabilityMode;

/// Config file name placed in the catalog data directory.
pub const CONFIG_FILE_NAME: &str = "vecmeta.toml";

/// Garbage collector settings, the `[gc]` table of `vecmeta.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcConfig {
    /// How long a deferred (still pinned) record waits before its next attempt
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum events handled per worker wake-up
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
}

fn default_poll_interval_ms() -> u64 {
    20
}

fn default_max_batch() -> usize {
    256
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            poll_interval_ms: default_poll_interval_ms(),
            max_batch: default_max_batch(),
        }
    }
}

impl GcConfig {
    /// Poll interval as a `Duration`
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Catalog configuration loaded from `vecmeta.toml`.
///
/// # Example
///
/// ```toml
/// durability = "standard"
/// compact_on_open = false
///
/// [gc]
/// poll_interval_ms = 20
/// max_batch = 256
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Durability mode: `"cache"`, `"standard"` or `"always"`.
    #[serde(default = "default_durability_str")]
    pub durability: String,
    /// Rewrite the record log right after recovery.
    #[serde(default)]
    pub compact_on_open: bool,
    /// Garbage collector settings.
    #[serde(default)]
    pub gc: GcConfig,
}

fn default_durability_str() -> String {
    "standard".to_string()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            durability: default_durability_str(),
            compact_on_open: false,
            gc: GcConfig::default(),
        }
    }
}

impl CatalogConfig {
    /// Config for an in-memory catalog
    pub fn cache() -> Self {
        CatalogConfig {
            durability: "cache".to_string(),
            ..Self::default()
        }
    }

    /// Parse the durability string into a `DurabilityMode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"cache"`, `"standard"` or `"always"`.
    pub fn durability_mode(&self) -> Result<DurabilityMode> {
        match self.durability.as_str() {
            "cache" => Ok(DurabilityMode::Cache),
            "standard" => Ok(DurabilityMode::standard_default()),
            "always" => Ok(DurabilityMode::Always),
            other => Err(MetaError::invalid_argument(format!(
                "Invalid durability mode '{}' in vecmeta.toml. Expected \"cache\", \"standard\" or \"always\".",
                other
            ))),
        }
    }

    /// Check every value; called before the catalog starts anything.
    pub fn validate(&self) -> Result<()> {
        self.durability_mode()?;
        if self.gc.poll_interval_ms == 0 {
            return Err(MetaError::invalid_argument(
                "gc.poll_interval_ms must be greater than zero",
            ));
        }
        if self.gc.max_batch == 0 {
            return Err(MetaError::invalid_argument(
                "gc.max_batch must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# vecmeta catalog configuration
#
# Durability mode: "standard" (default), "always" or "cache"
#   "standard" = periodic fsync (~100ms), may lose last interval on crash
#   "always"   = fsync every record, zero data loss
#   "cache"    = in-memory only, nothing written to disk
durability = "standard"

# Rewrite the record log after recovery to drop hard-deleted records.
compact_on_open = false

[gc]
# Delay before retrying a superseded record that is still pinned by a reader.
poll_interval_ms = 20
# Maximum number of records reclaimed per wake-up.
max_batch = 256
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MetaError::internal(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: CatalogConfig = toml::from_str(&content).map_err(|e| {
            MetaError::invalid_argument(format!(
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
                MetaError::internal(format!(
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
            .map_err(|e| MetaError::internal(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            MetaError::internal(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
