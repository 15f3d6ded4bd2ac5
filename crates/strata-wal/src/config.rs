//! WAL configuration.

use std::path::{Path, PathBuf};

use strata_common::config::StoreConfig;
use strata_common::constants::{
    DEFAULT_WAL_FILE_SIZE_LIMIT, MAX_WAL_FILE_SIZE_LIMIT, WAL_RECORD_OVERHEAD,
    WAL_SEGMENT_HEADER_SIZE,
};

/// When appended records are fsynced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Fsync before every append returns.
    #[default]
    EveryWrite,
    /// Write through to the OS on append; fsync only on [`Wal::sync`],
    /// segment rotation and checkpoints.
    ///
    /// [`Wal::sync`]: crate::Wal::sync
    Deferred,
}

/// Configuration for the Write-Ahead Log.
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Directory where WAL segments are stored.
    pub dir: PathBuf,

    /// Size cap of each segment file in bytes, header included.
    pub segment_size_limit: u64,

    /// Sync policy for durability.
    pub sync_policy: SyncPolicy,
}

impl WalConfig {
    /// Creates a new WAL configuration with the specified directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            segment_size_limit: DEFAULT_WAL_FILE_SIZE_LIMIT,
            sync_policy: SyncPolicy::default(),
        }
    }

    /// Derives the WAL configuration of a store.
    pub fn from_store_config(dir: impl Into<PathBuf>, config: &StoreConfig) -> Self {
        let policy = if config.sync_on_commit {
            SyncPolicy::EveryWrite
        } else {
            SyncPolicy::Deferred
        };
        Self::new(dir)
            .with_segment_size_limit(config.wal_file_size_limit)
            .with_sync_policy(policy)
    }

    /// Sets the segment size cap.
    #[must_use]
    pub fn with_segment_size_limit(mut self, limit: u64) -> Self {
        self.segment_size_limit = limit;
        self
    }

    /// Sets the sync policy.
    #[must_use]
    pub fn with_sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync_policy = policy;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        let min = (WAL_SEGMENT_HEADER_SIZE + WAL_RECORD_OVERHEAD) as u64;
        if self.segment_size_limit < min {
            return Err(format!(
                "segment size limit must hold at least one empty record ({min} bytes)"
            ));
        }

        if self.segment_size_limit > MAX_WAL_FILE_SIZE_LIMIT {
            return Err("segment size limit must fit in 32 bits".to_string());
        }

        Ok(())
    }

    /// Largest record an empty segment can hold.
    pub fn max_record_size(&self) -> usize {
        (self.segment_size_limit as usize).saturating_sub(WAL_SEGMENT_HEADER_SIZE)
    }

    /// Returns the path of a segment file.
    pub fn segment_path(&self, segment: u32) -> PathBuf {
        segment_path(&self.dir, segment)
    }
}

/// Returns the path of segment `segment` under `dir`.
pub(crate) fn segment_path(dir: &Path, segment: u32) -> PathBuf {
    dir.join(format!("wal_{:016x}.log", segment))
}

/// Parses the segment number out of a segment file path.
pub(crate) fn parse_segment_path(path: &Path) -> Option<u32> {
    if path.extension()? != "log" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let hex = stem.strip_prefix("wal_")?;
    if hex.len() != 16 {
        return None;
    }
    u64::from_str_radix(hex, 16)
        .ok()
        .and_then(|n| u32::try_from(n).ok())
}
