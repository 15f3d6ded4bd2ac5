use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use strata_common::constants::{PAGE_FILE_NAME, WAL_DIR_NAME};
use strata_common::{StoreConfig, StrataResult};
use strata_engine::Store;

/// Installs a tracing subscriber for tests.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`. Output goes
/// through the test harness so it only shows for failing tests. Calling this
/// more than once is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// A store directory that is deleted when dropped.
#[derive(Debug)]
pub struct TestDir {
    dir: TempDir,
    config: StoreConfig,
}

impl TestDir {
    /// Creates a directory for a store with 512-byte pages and order 4.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::for_testing())
    }

    /// Creates a directory for a store with the given configuration.
    pub fn with_config(config: StoreConfig) -> Self {
        init_tracing();
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
            config,
        }
    }

    /// Store directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Configuration stores are opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Page file path.
    pub fn page_file(&self) -> PathBuf {
        self.path().join(PAGE_FILE_NAME)
    }

    /// Log segment directory.
    pub fn wal_dir(&self) -> PathBuf {
        self.path().join(WAL_DIR_NAME)
    }

    /// Opens (or reopens) the store, running recovery.
    pub fn open(&self) -> StrataResult<Store> {
        Store::open(self.path(), self.config.clone())
    }

    /// Log segment files, in segment order.
    pub fn segment_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.wal_dir()) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "log"))
            .collect();
        files.sort();
        files
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-width key for an integer, so byte order matches numeric order.
pub fn key(i: u64) -> Vec<u8> {
    format!("key{i:08}").into_bytes()
}

/// Value for an integer key.
pub fn value(i: u64) -> Vec<u8> {
    format!("value{i}").into_bytes()
}
