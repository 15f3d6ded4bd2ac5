//! The store handle.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use strata_common::config::StoreConfig;
use strata_common::constants::{min_wal_file_size, PAGE_FILE_NAME, WAL_DIR_NAME};
use strata_common::error::{StrataError, StrataResult};
use strata_common::types::{Lsn, TxnId};
use strata_storage::page::CheckpointMarker;
use strata_storage::{
    BTree, CommittedView, KeyRange, PageStore, PageStoreOptions, PageStoreStats, TreeConfig,
    TreeError, TreeStats,
};
use strata_txn::{TransactionManager, TransactionStatsSnapshot, TxnError, TxnPages};
use strata_wal::{CheckpointInfo, CheckpointManager, Wal, WalConfig, WalStatsSnapshot};

use crate::recovery::{RecoveryManager, RecoveryReport};

/// Point-in-time statistics for a store.
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Page store counters.
    pub pages: PageStoreStats,
    /// Log counters.
    pub wal: WalStatsSnapshot,
    /// Transaction counters.
    pub transactions: TransactionStatsSnapshot,
    /// Durable end of the log.
    pub durable_lsn: Lsn,
    /// Last completed checkpoint.
    pub last_checkpoint: Option<CheckpointInfo>,
}

/// A durable, ordered key-value store.
///
/// A store is a directory holding the page file and the `wal/` segment
/// directory. Opening it runs crash recovery. [`Store::close`] checkpoints;
/// dropping a store without closing it behaves like a crash.
///
/// # Example
///
/// ```rust,no_run
/// use strata_common::config::StoreConfig;
/// use strata_engine::Store;
///
/// # fn main() -> strata_common::StrataResult<()> {
/// let store = Store::open("/tmp/strata-demo", StoreConfig::default())?;
///
/// let mut txn = store.begin_transaction()?;
/// txn.insert(b"apple", b"red")?;
/// txn.insert(b"banana", b"yellow")?;
/// txn.commit()?;
///
/// assert_eq!(&store.search(b"apple")?[..], b"red");
/// store.close()?;
/// # Ok(())
/// # }
/// ```
pub struct Store {
    path: PathBuf,
    config: StoreConfig,
    pages: Arc<PageStore>,
    wal: Arc<Wal>,
    txns: TransactionManager,
    tree: BTree,
    latch: RwLock<()>,
    checkpointer: CheckpointManager,
    recovery: RecoveryReport,
    closed: AtomicBool,
}

impl Store {
    /// Opens the store at `path`, creating it if needed, and recovers it.
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> StrataResult<Self> {
        config.validate().map_err(StrataError::config)?;
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        let pages = Arc::new(PageStore::open(
            path.join(PAGE_FILE_NAME),
            PageStoreOptions::from(&config),
        )?);

        // An existing store keeps the geometry it was created with.
        let page_size = pages.page_size();
        if config.wal_file_size_limit < min_wal_file_size(page_size) {
            return Err(StrataError::config(format!(
                "wal_file_size_limit {} cannot hold a full update of a {} byte page",
                config.wal_file_size_limit, page_size
            )));
        }
        let tree_config = TreeConfig::new(page_size, pages.tree_order())?
            .with_allow_overwrite(config.allow_overwrite);

        let wal = Arc::new(Wal::open(WalConfig::from_store_config(
            path.join(WAL_DIR_NAME),
            &config,
        ))?);

        let checkpointer = CheckpointManager::new();
        let recovery = RecoveryManager::new(&pages, &wal, &checkpointer).run()?;

        let txns = TransactionManager::new(Arc::clone(&pages), Arc::clone(&wal));
        txns.advance_txn_id(recovery.next_txn_id);

        info!(
            path = %path.display(),
            page_size,
            tree_order = tree_config.order(),
            next_txn_id = %recovery.next_txn_id,
            "Opened store"
        );

        Ok(Self {
            path,
            config,
            pages,
            wal,
            txns,
            tree: BTree::new(tree_config),
            latch: RwLock::new(()),
            checkpointer,
            recovery,
            closed: AtomicBool::new(false),
        })
    }

    /// Returns the store directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the configuration the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns what recovery did when the store was opened.
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    fn ensure_open(&self) -> StrataResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StrataError::Closed)
        } else {
            Ok(())
        }
    }

    /// Starts a transaction.
    pub fn begin_transaction(&self) -> StrataResult<Transaction<'_>> {
        self.ensure_open()?;
        let id = self.txns.begin();
        Ok(Transaction {
            store: self,
            id,
            finished: false,
        })
    }

    /// Looks up the committed value of `key`.
    pub fn search(&self, key: &[u8]) -> StrataResult<Bytes> {
        self.ensure_open()?;
        let _latch = self.latch.read();
        Ok(self.tree.search(&CommittedView(&self.pages), key)?)
    }

    /// Returns the committed pairs in `range`, in key order.
    pub fn scan(&self, range: &KeyRange) -> StrataResult<Vec<(Bytes, Bytes)>> {
        self.ensure_open()?;
        let _latch = self.latch.read();
        Ok(self.tree.scan(&CommittedView(&self.pages), range)?)
    }

    /// Inserts `key` in a transaction of its own.
    pub fn insert(&self, key: &[u8], value: &[u8]) -> StrataResult<Option<Bytes>> {
        let mut txn = self.begin_transaction()?;
        let previous = txn.insert(key, value)?;
        txn.commit()?;
        Ok(previous)
    }

    /// Deletes `key` in a transaction of its own and returns its value.
    pub fn delete(&self, key: &[u8]) -> StrataResult<Bytes> {
        let mut txn = self.begin_transaction()?;
        let value = txn.delete(key)?;
        txn.commit()?;
        Ok(value)
    }

    /// Checks the committed tree's structure.
    pub fn verify(&self) -> StrataResult<TreeStats> {
        self.ensure_open()?;
        let _latch = self.latch.read();
        Ok(self.tree.verify(&CommittedView(&self.pages))?)
    }

    /// Flushes committed pages and moves the recovery floor forward,
    /// deleting log segments no longer needed.
    pub fn checkpoint(&self) -> StrataResult<CheckpointInfo> {
        self.ensure_open()?;
        self.run_checkpoint()
    }

    fn run_checkpoint(&self) -> StrataResult<CheckpointInfo> {
        // Holding the latch keeps commits from publishing between the log
        // sync and the page flush.
        let _latch = self.latch.read();
        let floor = self.txns.checkpoint_floor();
        let next_txn_id = self.txns.next_txn_id();
        let pages = &self.pages;

        self.checkpointer.checkpoint(
            &self.wal,
            floor,
            next_txn_id,
            || pages.flush().map_err(StrataError::from),
            |floor, next_txn_id| {
                pages
                    .write_checkpoint(CheckpointMarker { floor, next_txn_id })
                    .map_err(StrataError::from)
            },
        )
    }

    /// True once too many pages are dirty or the log has grown by
    /// `checkpoint_wal_segments` segments since the last checkpoint.
    fn checkpoint_due(&self) -> bool {
        let dirty = self.pages.dirty_count();
        if dirty > self.config.max_dirty_pages {
            debug!(dirty, "Dirty page limit reached");
            return true;
        }
        let since = self
            .checkpointer
            .last_checkpoint()
            .map_or(0, |info| info.lsn.segment());
        let written = self.wal.next_lsn().segment().saturating_sub(since);
        if written >= self.config.checkpoint_wal_segments {
            debug!(segments = written, "Log growth limit reached");
            return true;
        }
        false
    }

    fn maybe_checkpoint(&self) {
        if self.checkpointer.is_in_progress() || !self.checkpoint_due() {
            return;
        }
        if let Err(err) = self.run_checkpoint() {
            warn!(error = %err, "Automatic checkpoint failed");
        }
    }

    /// Returns current statistics.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            pages: self.pages.stats(),
            wal: self.wal.stats().snapshot(),
            transactions: self.txns.stats().snapshot(),
            durable_lsn: self.wal.durable_lsn(),
            last_checkpoint: self.checkpointer.last_checkpoint(),
        }
    }

    /// Checkpoints, syncs the log and closes the store.
    ///
    /// Transactions still running are left to recovery, which rolls them
    /// back the next time the store is opened. If the closing checkpoint
    /// fails the store stays open and the error is returned.
    pub fn close(&self) -> StrataResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        let active = self.txns.active_count();
        if active > 0 {
            warn!(active, "Closing store with transactions still running");
        }

        self.run_checkpoint()?;
        self.wal.close()?;
        self.closed.store(true, Ordering::Release);
        info!(path = %self.path.display(), "Closed store");
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("pages", &self.pages)
            .field("transactions", &self.txns)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// A transaction on a [`Store`].
///
/// Changes are visible to this transaction at once and to everyone else
/// after [`commit`](Transaction::commit). Dropping an unfinished
/// transaction aborts it.
///
/// A failed insert or delete aborts the transaction unless the failure was
/// a missing key, a duplicate key or an oversized entry, which are detected
/// before anything is written.
pub struct Transaction<'a> {
    store: &'a Store,
    id: TxnId,
    finished: bool,
}

impl Transaction<'_> {
    /// Returns the transaction ID.
    pub fn id(&self) -> TxnId {
        self.id
    }

    fn ensure_active(&self) -> StrataResult<()> {
        if self.finished {
            return Err(StrataError::TransactionNotActive {
                txn_id: self.id,
                state: "aborted".to_string(),
            });
        }
        Ok(())
    }

    fn pages(&self) -> TxnPages<'_> {
        TxnPages::new(&self.store.txns, self.id)
    }

    /// Looks up `key`, seeing this transaction's own changes.
    pub fn search(&self, key: &[u8]) -> StrataResult<Bytes> {
        self.ensure_active()?;
        let _latch = self.store.latch.read();
        Ok(self.store.tree.search(&self.pages(), key)?)
    }

    /// Returns the pairs in `range` as this transaction sees them.
    pub fn scan(&self, range: &KeyRange) -> StrataResult<Vec<(Bytes, Bytes)>> {
        self.ensure_active()?;
        let _latch = self.store.latch.read();
        Ok(self.store.tree.scan(&self.pages(), range)?)
    }

    /// Inserts a key-value pair. Returns the previous value when the store
    /// allows overwrites and the key existed.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> StrataResult<Option<Bytes>> {
        self.ensure_active()?;
        let result = {
            let _latch = self.store.latch.write();
            self.store.tree.insert(&mut self.pages(), key, value)
        };
        self.settle(result)
    }

    /// Deletes `key` and returns its value.
    pub fn delete(&mut self, key: &[u8]) -> StrataResult<Bytes> {
        self.ensure_active()?;
        let result = {
            let _latch = self.store.latch.write();
            self.store.tree.delete(&mut self.pages(), key)
        };
        self.settle(result)
    }

    /// Aborts the transaction after a failure that may have left its
    /// staged tree half-changed.
    fn settle<T>(&mut self, result: Result<T, TxnError>) -> StrataResult<T> {
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let harmless = matches!(
            err,
            TxnError::Tree(
                TreeError::KeyNotFound | TreeError::DuplicateKey | TreeError::EntryTooLarge { .. }
            )
        );
        if !harmless {
            self.finished = true;
            match self.store.txns.abort(self.id) {
                Ok(()) => debug!(txn = %self.id, error = %err, "Aborted transaction after failed write"),
                // Already aborted by a failed log append.
                Err(TxnError::NotFound(_)) => {}
                Err(abort_err) => warn!(txn = %self.id, error = %abort_err, "Abort failed"),
            }
        }
        Err(err.into())
    }

    /// Commits the transaction. Returns the LSN of its commit record, or
    /// `None` if it changed nothing.
    pub fn commit(mut self) -> StrataResult<Option<Lsn>> {
        self.ensure_active()?;
        self.finished = true;

        let lsn = self.store.txns.log_commit(self.id)?;
        {
            let _latch = self.store.latch.write();
            self.store.txns.apply_commit(self.id)?;
        }

        self.store.maybe_checkpoint();
        Ok(lsn)
    }

    /// Aborts the transaction.
    pub fn abort(mut self) -> StrataResult<()> {
        self.ensure_active()?;
        self.finished = true;
        Ok(self.store.txns.abort(self.id)?)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.store.txns.abort(self.id) {
            debug!(txn = %self.id, error = %err, "Abort on drop failed");
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("finished", &self.finished)
            .finish()
    }
}
