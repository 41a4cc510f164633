//! Configuration for the support tree and its worker.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Coordinate offset applied when growing the root window. Every tree uses
/// the same value so independent trees divide space identically.
pub const DEFAULT_ROOT_OFFSET: i32 = 0xAAAA_AAA0_u32 as i32;

/// Settings for a [`Tree`](crate::octree::Tree) and the worker that drives it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SupportConfig {
    /// Edge length of a loadable chunk. Power of two, at least 2.
    pub chunk_size: i32,
    /// Offset used to align root growth. Masked down to a multiple of the
    /// chunk size before use.
    pub root_offset: i32,
    /// Idle window before the worker runs a detachment pass, in milliseconds.
    pub debounce_ms: u64,
    /// Run a full validation every N structural updates. Off by default.
    pub audit_interval: Option<u32>,
    /// Pairs per bin for subchain sets.
    pub subchain_bin_width: usize,
    /// Pairs per bin for touching sets.
    pub touching_bin_width: usize,
}

impl Default for SupportConfig {
    fn default() -> Self {
        Self {
            chunk_size: 32,
            root_offset: DEFAULT_ROOT_OFFSET,
            debounce_ms: 100,
            audit_interval: None,
            subchain_bin_width: 8,
            touching_bin_width: 6,
        }
    }
}

impl SupportConfig {
    /// Config with a different chunk size and defaults elsewhere.
    pub fn with_chunk_size(chunk_size: i32) -> Self {
        Self {
            chunk_size,
            ..Self::default()
        }
    }

    /// Check that the settings describe a usable tree.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size < 2 || self.chunk_size.count_ones() != 1 {
            return Err(Error::Config(format!(
                "chunk_size must be a power of two >= 2, got {}",
                self.chunk_size
            )));
        }
        if self.subchain_bin_width == 0 || self.touching_bin_width == 0 {
            return Err(Error::Config("bin widths must be non-zero".into()));
        }
        if self.audit_interval == Some(0) {
            return Err(Error::Config("audit_interval must be at least 1".into()));
        }
        Ok(())
    }

    /// Root offset rounded down to a multiple of the chunk size.
    pub fn aligned_root_offset(&self) -> i32 {
        self.root_offset & !(self.chunk_size - 1)
    }

    /// Debounce window as a duration.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Save to file (sync)
    pub fn save_sync(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from file (sync) and validate
    pub fn load_sync(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = SupportConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 32);
        assert_eq!(config.debounce(), Duration::from_millis(100));
    }

    #[test]
    fn test_rejects_bad_chunk_size() {
        assert!(SupportConfig::with_chunk_size(12).validate().is_err());
        assert!(SupportConfig::with_chunk_size(1).validate().is_err());
        assert!(SupportConfig::with_chunk_size(0).validate().is_err());
        assert!(SupportConfig::with_chunk_size(4).validate().is_ok());
    }

    #[test]
    fn test_aligned_root_offset() {
        let config = SupportConfig::with_chunk_size(64);
        assert_eq!(config.aligned_root_offset() % 64, 0);
        let config = SupportConfig::with_chunk_size(32);
        assert_eq!(config.aligned_root_offset(), DEFAULT_ROOT_OFFSET);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("support.json");

        let config = SupportConfig {
            chunk_size: 16,
            audit_interval: Some(50),
            ..SupportConfig::default()
        };
        config.save_sync(&path).unwrap();

        let loaded = SupportConfig::load_sync(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_fills_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "chunk_size": 8 }"#).unwrap();

        let loaded = SupportConfig::load_sync(&path).unwrap();
        assert_eq!(loaded.chunk_size, 8);
        assert_eq!(loaded.debounce_ms, 100);
    }

    #[test]
    fn test_load_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "chunk_size": 6 }"#).unwrap();

        assert!(matches!(SupportConfig::load_sync(&path), Err(Error::Config(_))));
    }
}
