//! Store configuration.
//!
//! `StoreConfig` carries the options recognized by `Store::open`. It can be
//! built in code or loaded from a TOML file; missing keys take defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    max_entry_size, max_key_size, min_wal_file_size, DEFAULT_CHECKPOINT_WAL_SEGMENTS,
    DEFAULT_MAX_DIRTY_PAGES, DEFAULT_PAGE_SIZE, DEFAULT_TREE_ORDER, DEFAULT_WAL_FILE_SIZE_LIMIT, MAX_PAGE_SIZE, MAX_TREE_ORDER, MAX_WAL_FILE_SIZE_LIMIT,
    MIN_KEY_CAPACITY, MIN_PAGE_SIZE, MIN_TREE_ORDER,
};
use crate::error::{StrataError, StrataResult};

/// Configuration for a store.
///
/// # Example
///
/// ```rust
/// use strata_common::config::StoreConfig;
///
/// let config = StoreConfig::from_toml_str("tree_order = 4\nsync_on_commit = false").unwrap();
/// assert_eq!(config.tree_order, 4);
/// assert!(!config.sync_on_commit);
/// assert_eq!(config.page_size, 4096);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Bytes per page. Must be a power of 2.
    /// Only used when creating a store; an existing store keeps its own.
    pub page_size: usize,

    /// Maximum children per internal node (the tree order M).
    /// Only used when creating a store.
    ///
    /// A full node must fit one page, so the order caps entry sizes:
    /// see [`StoreConfig::max_key_size`] and [`StoreConfig::max_entry_size`].
    /// The defaults (4096-byte pages, order 8) allow 506 bytes.
    pub tree_order: usize,

    /// Size cap of each WAL segment file in bytes.
    pub wal_file_size_limit: u64,

    /// Fsync every log append, so a returned commit is durable.
    /// When false, appends reach the OS immediately but are fsynced only at
    /// checkpoints, on close, and before dirty pages are written.
    pub sync_on_commit: bool,

    /// Let `insert` replace the value of an existing key instead of
    /// failing with `DuplicateKey`.
    pub allow_overwrite: bool,

    /// Dirty committed pages that trigger an automatic checkpoint.
    pub max_dirty_pages: usize,

    /// WAL segments written since the last checkpoint that trigger an
    /// automatic checkpoint, bounding log growth under rewrites of the
    /// same few pages.
    pub checkpoint_wal_segments: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            tree_order: DEFAULT_TREE_ORDER,
            wal_file_size_limit: DEFAULT_WAL_FILE_SIZE_LIMIT,
            sync_on_commit: true,
            allow_overwrite: false,
            max_dirty_pages: DEFAULT_MAX_DIRTY_PAGES,
            checkpoint_wal_segments: DEFAULT_CHECKPOINT_WAL_SEGMENTS,
        }
    }
}

impl StoreConfig {
    /// Creates a small configuration for tests: 512-byte pages, order 4.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            page_size: MIN_PAGE_SIZE,
            tree_order: 4,
            wal_file_size_limit: 64 * 1024,
            ..Default::default()
        }
    }

    /// Sets the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the tree order.
    #[must_use]
    pub fn with_tree_order(mut self, order: usize) -> Self {
        self.tree_order = order;
        self
    }

    /// Sets the WAL segment size cap.
    #[must_use]
    pub fn with_wal_file_size_limit(mut self, limit: u64) -> Self {
        self.wal_file_size_limit = limit;
        self
    }

    /// Sets whether every log append is fsynced.
    #[must_use]
    pub fn with_sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }

    /// Sets whether inserts may overwrite existing keys.
    #[must_use]
    pub fn with_allow_overwrite(mut self, allow: bool) -> Self {
        self.allow_overwrite = allow;
        self
    }

    /// Sets the automatic checkpoint threshold.
    #[must_use]
    pub fn with_max_dirty_pages(mut self, pages: usize) -> Self {
        self.max_dirty_pages = pages;
        self
    }

    /// Sets how many new WAL segments trigger an automatic checkpoint.
    #[must_use]
    pub fn with_checkpoint_wal_segments(mut self, segments: u32) -> Self {
        self.checkpoint_wal_segments = segments;
        self
    }

    /// Longest key this geometry accepts.
    pub fn max_key_size(&self) -> usize {
        max_key_size(self.page_size, self.tree_order)
    }

    /// Longest key plus value this geometry accepts.
    pub fn max_entry_size(&self) -> usize {
        max_entry_size(self.page_size, self.tree_order)
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !self.page_size.is_power_of_two() {
            return Err("page_size must be a power of 2".to_string());
        }

        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(format!(
                "page_size must be between {MIN_PAGE_SIZE} and {MAX_PAGE_SIZE} bytes"
            ));
        }

        if !(MIN_TREE_ORDER..=MAX_TREE_ORDER).contains(&self.tree_order) {
            return Err(format!(
                "tree_order must be between {MIN_TREE_ORDER} and {MAX_TREE_ORDER}"
            ));
        }

        if self.max_key_size() < MIN_KEY_CAPACITY {
            return Err(format!(
                "tree_order {} leaves no room for keys in {}-byte pages",
                self.tree_order, self.page_size
            ));
        }

        let min_wal = min_wal_file_size(self.page_size);
        if self.wal_file_size_limit < min_wal {
            return Err(format!(
                "wal_file_size_limit must hold a full-page update record ({min_wal} bytes)"
            ));
        }

        if self.wal_file_size_limit > MAX_WAL_FILE_SIZE_LIMIT {
            return Err("wal_file_size_limit must fit in 32 bits".to_string());
        }

        if self.max_dirty_pages == 0 {
            return Err("max_dirty_pages must be positive".to_string());
        }

        if self.checkpoint_wal_segments == 0 {
            return Err("checkpoint_wal_segments must be positive".to_string());
        }

        Ok(())
    }

    /// Parses a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> StrataResult<Self> {
        toml::from_str(content).map_err(|e| StrataError::config(e.to_string()))
    }

    /// Loads a configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> StrataResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Converts the configuration to a TOML string.
    pub fn to_toml(&self) -> StrataResult<String> {
        toml::to_string_pretty(self).map_err(|e| StrataError::config(e.to_string()))
    }

    /// Saves the configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> StrataResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.page_size, 4096);
        assert_eq!(config.wal_file_size_limit, 16 * 1024 * 1024);
        assert!(config.sync_on_commit);
        assert!(config.validate().is_ok());
        assert!(StoreConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(StoreConfig::default().with_page_size(1000).validate().is_err());
        assert!(StoreConfig::default().with_page_size(256).validate().is_err());
        assert!(StoreConfig::default().with_tree_order(2).validate().is_err());
        assert!(StoreConfig::for_testing()
            .with_tree_order(64)
            .validate()
            .is_err());
        assert!(StoreConfig::default()
            .with_wal_file_size_limit(1024)
            .validate()
            .is_err());
        assert!(StoreConfig::default()
            .with_max_dirty_pages(0)
            .validate()
            .is_err());
        assert!(StoreConfig::default()
            .with_checkpoint_wal_segments(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_default_entry_limits() {
        let config = StoreConfig::default();
        assert_eq!(config.tree_order, 8);
        assert_eq!(config.max_key_size(), 506);
        assert_eq!(config.max_entry_size(), 506);

        let small = StoreConfig::for_testing();
        assert_eq!(small.max_key_size(), 121);
        assert!(StoreConfig::default().with_page_size(8192).max_entry_size() > 1000);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = StoreConfig::default()
            .with_tree_order(16)
            .with_sync_on_commit(false);
        let text = config.to_toml().unwrap();
        assert!(text.contains("tree_order = 16"));
        assert_eq!(StoreConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = StoreConfig::from_toml_str("page_size = 8192").unwrap();
        assert_eq!(config.page_size, 8192);
        assert_eq!(config.tree_order, StoreConfig::default().tree_order);
    }

    #[test]
    fn test_bad_toml() {
        let err = StoreConfig::from_toml_str("page_size = \"big\"").unwrap_err();
        assert!(matches!(err, StrataError::Config { .. }));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf").join("strata.toml");

        let config = StoreConfig::for_testing().with_allow_overwrite(true);
        config.save(&path).unwrap();

        let loaded = StoreConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
