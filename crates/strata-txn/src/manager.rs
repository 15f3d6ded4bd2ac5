//! Transaction manager.
//!
//! Every page change made by a transaction follows the same path: claim the
//! page, log its before and after images, then stage the new version where
//! only the owning transaction can see it. Commit makes the log durable
//! first and publishes the staged pages second.
//!
//! # Transaction States
//!
//! ```text
//! ┌────────┐ log_commit() ┌────────────┐ apply_commit() ┌───────────┐
//! │ Active │─────────────▶│ Committing │───────────────▶│ Committed │
//! └────────┘              └────────────┘                └───────────┘
//!      │
//!      │ abort() / failed log append
//!      ▼
//! ┌─────────┐
//! │ Aborted │
//! └─────────┘
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use strata_common::types::{Lsn, PageId, TxnId};
use strata_storage::{PageStore, StorageError};
use strata_wal::{Wal, WalRecord};

use crate::error::{TxnError, TxnResult};

/// The state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Commit record is logged; staged pages are not yet published.
    Committing,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

impl TransactionState {
    /// Returns true if the transaction can perform operations.
    pub fn is_active(&self) -> bool {
        *self == TransactionState::Active
    }

    /// Returns true if the transaction has ended.
    pub fn is_ended(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Active => write!(f, "Active"),
            TransactionState::Committing => write!(f, "Committing"),
            TransactionState::Committed => write!(f, "Committed"),
            TransactionState::Aborted => write!(f, "Aborted"),
        }
    }
}

/// A change to a byte range of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMutation {
    /// The page.
    pub page_id: PageId,
    /// First byte changed.
    pub offset: usize,
    /// New contents of the range.
    pub data: Bytes,
}

impl PageMutation {
    /// Creates a mutation.
    pub fn new(page_id: PageId, offset: usize, data: impl Into<Bytes>) -> Self {
        Self {
            page_id,
            offset,
            data: data.into(),
        }
    }
}

/// Bookkeeping for one transaction.
struct Transaction {
    id: TxnId,
    state: TransactionState,
    begin_lsn: Option<Lsn>,
    last_lsn: Option<Lsn>,
    updates: u64,
    allocated: Vec<PageId>,
    freed: Vec<PageId>,
    started_at: Instant,
}

impl Transaction {
    fn new(id: TxnId) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            begin_lsn: None,
            last_lsn: None,
            updates: 0,
            allocated: Vec::new(),
            freed: Vec::new(),
            started_at: Instant::now(),
        }
    }

    fn ensure_active(&self) -> TxnResult<()> {
        if self.state.is_active() {
            Ok(())
        } else {
            Err(TxnError::NotActive {
                txn_id: self.id,
                state: self.state,
            })
        }
    }

    fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("begin_lsn", &self.begin_lsn)
            .field("updates", &self.updates)
            .field("allocated", &self.allocated.len())
            .field("freed", &self.freed.len())
            .finish()
    }
}

/// Statistics about the transaction manager.
#[derive(Debug, Default)]
pub struct TransactionStats {
    /// Total transactions started.
    pub started: AtomicU64,
    /// Total transactions committed.
    pub committed: AtomicU64,
    /// Total transactions aborted.
    pub aborted: AtomicU64,
    /// Currently active transactions.
    pub active: AtomicU64,
    /// Total write conflicts detected.
    pub conflicts: AtomicU64,
    /// Transactions aborted because the log rejected an append.
    pub log_failures: AtomicU64,
}

/// Point-in-time copy of [`TransactionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStatsSnapshot {
    /// Total transactions started.
    pub started: u64,
    /// Total transactions committed.
    pub committed: u64,
    /// Total transactions aborted.
    pub aborted: u64,
    /// Currently active transactions.
    pub active: u64,
    /// Total write conflicts detected.
    pub conflicts: u64,
    /// Transactions aborted because the log rejected an append.
    pub log_failures: u64,
}

impl TransactionStats {
    /// Creates new stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a snapshot of the counters.
    pub fn snapshot(&self) -> TransactionStatsSnapshot {
        TransactionStatsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            log_failures: self.log_failures.load(Ordering::Relaxed),
        }
    }
}

/// The transaction manager coordinates page changes with the log.
pub struct TransactionManager {
    pages: Arc<PageStore>,
    wal: Arc<Wal>,
    transactions: RwLock<HashMap<TxnId, Mutex<Transaction>>>,
    stats: TransactionStats,
    next_txn_id: AtomicU64,
}

impl TransactionManager {
    /// Creates a transaction manager over a page store and its log.
    pub fn new(pages: Arc<PageStore>, wal: Arc<Wal>) -> Self {
        Self {
            pages,
            wal,
            transactions: RwLock::new(HashMap::new()),
            stats: TransactionStats::new(),
            next_txn_id: AtomicU64::new(TxnId::MIN.as_u64()),
        }
    }

    /// Returns the page store.
    pub fn pages(&self) -> &Arc<PageStore> {
        &self.pages
    }

    /// Returns the log.
    pub fn wal(&self) -> &Arc<Wal> {
        &self.wal
    }

    /// Returns the statistics.
    pub fn stats(&self) -> &TransactionStats {
        &self.stats
    }

    /// First transaction id not yet handed out.
    pub fn next_txn_id(&self) -> TxnId {
        TxnId::new(self.next_txn_id.load(Ordering::Acquire))
    }

    /// Makes sure no id below `next` is handed out again.
    pub fn advance_txn_id(&self, next: TxnId) {
        self.next_txn_id.fetch_max(next.as_u64(), Ordering::AcqRel);
    }

    /// Begins a new transaction. Nothing is logged until its first change.
    pub fn begin(&self) -> TxnId {
        let txn_id = TxnId::new(self.next_txn_id.fetch_add(1, Ordering::SeqCst));
        self.transactions
            .write()
            .insert(txn_id, Mutex::new(Transaction::new(txn_id)));

        self.stats.started.fetch_add(1, Ordering::Relaxed);
        self.stats.active.fetch_add(1, Ordering::Relaxed);
        txn_id
    }

    /// Returns the state of a running transaction, or `None` once it has
    /// finished.
    pub fn state(&self, txn_id: TxnId) -> Option<TransactionState> {
        self.transactions
            .read()
            .get(&txn_id)
            .map(|txn| txn.lock().state)
    }

    /// Number of transactions not yet finished.
    pub fn active_count(&self) -> usize {
        self.transactions.read().len()
    }

    /// Reads a page as `txn_id` sees it.
    pub fn read_page(&self, txn_id: TxnId, page_id: PageId) -> TxnResult<Bytes> {
        Ok(self.pages.read_for(txn_id, page_id)?)
    }

    /// Takes write ownership of a page and returns the version the
    /// transaction builds on.
    pub fn claim(&self, txn_id: TxnId, page_id: PageId) -> TxnResult<Bytes> {
        let txns = self.transactions.read();
        let txn = txns.get(&txn_id).ok_or(TxnError::NotFound(txn_id))?.lock();
        txn.ensure_active()?;
        self.claim_page(txn_id, page_id)
    }

    fn claim_page(&self, txn_id: TxnId, page_id: PageId) -> TxnResult<Bytes> {
        match self.pages.claim(txn_id, page_id) {
            Ok(data) => Ok(data),
            Err(StorageError::PageOwned { owner, .. }) => {
                self.stats.conflicts.fetch_add(1, Ordering::Relaxed);
                debug!(txn = %txn_id, %page_id, %owner, "Write conflict");
                Err(TxnError::WriteConflict {
                    txn_id,
                    page_id,
                    owner,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Applies a page change on behalf of a transaction.
    ///
    /// The change is logged before it is staged. Returns the LSN of the
    /// update record, or `None` if the range already held these bytes. If
    /// the log rejects the append the transaction is aborted and the call
    /// fails with [`TxnError::LogIo`].
    pub fn execute(&self, txn_id: TxnId, mutation: PageMutation) -> TxnResult<Option<Lsn>> {
        let result = {
            let txns = self.transactions.read();
            let entry = txns.get(&txn_id).ok_or(TxnError::NotFound(txn_id))?;
            let mut txn = entry.lock();
            self.execute_locked(&mut txn, mutation)
        };

        if matches!(result, Err(TxnError::LogIo { .. })) {
            self.forget(txn_id);
        }
        result
    }

    fn execute_locked(&self, txn: &mut Transaction, mutation: PageMutation) -> TxnResult<Option<Lsn>> {
        txn.ensure_active()?;
        let PageMutation {
            page_id,
            offset,
            data,
        } = mutation;

        let current = self.claim_page(txn.id, page_id)?;
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= current.len())
            .ok_or(StorageError::OutOfBounds {
                page_id,
                offset,
                len: data.len(),
                page_size: current.len(),
            })?;

        let before = current.slice(offset..end);
        if before == data {
            return Ok(None);
        }

        if txn.begin_lsn.is_none() {
            let lsn = self.log(txn, &WalRecord::begin(txn.id))?;
            txn.begin_lsn = Some(lsn);
        }
        let record = WalRecord::update(txn.id, page_id, offset as u32, before, data.clone());
        let lsn = self.log(txn, &record)?;
        txn.updates += 1;

        let mut page = current.to_vec();
        page[offset..end].copy_from_slice(&data);
        self.pages.stage(txn.id, page_id, Bytes::from(page), lsn)?;
        Ok(Some(lsn))
    }

    /// Appends a record for `txn`, aborting it if the append fails.
    fn log(&self, txn: &mut Transaction, record: &WalRecord) -> TxnResult<Lsn> {
        match self.wal.append(record) {
            Ok(lsn) => {
                txn.last_lsn = Some(lsn);
                Ok(lsn)
            }
            Err(source) => {
                warn!(txn = %txn.id, error = %source, "Log append failed, aborting transaction");
                self.stats.log_failures.fetch_add(1, Ordering::Relaxed);
                self.rollback(txn);
                Err(TxnError::LogIo {
                    txn_id: txn.id,
                    source,
                })
            }
        }
    }

    /// Allocates a page for a transaction. The page returns to the free list
    /// if the transaction aborts.
    pub fn allocate_page(&self, txn_id: TxnId) -> TxnResult<PageId> {
        let txns = self.transactions.read();
        let mut txn = txns.get(&txn_id).ok_or(TxnError::NotFound(txn_id))?.lock();
        txn.ensure_active()?;

        let page_id = self.pages.allocate();
        txn.allocated.push(page_id);
        Ok(page_id)
    }

    /// Frees a page for a transaction.
    ///
    /// The page is zeroed through a logged change now; it joins the free
    /// list only when the transaction commits.
    pub fn free_page(&self, txn_id: TxnId, page_id: PageId) -> TxnResult<()> {
        if page_id.is_meta() {
            return Err(StorageError::MetaPageFree.into());
        }
        let zeroed = vec![0u8; self.pages.page_size()];
        self.execute(txn_id, PageMutation::new(page_id, 0, zeroed))?;

        let txns = self.transactions.read();
        let mut txn = txns.get(&txn_id).ok_or(TxnError::NotFound(txn_id))?.lock();
        txn.freed.push(page_id);
        Ok(())
    }

    /// First phase of commit: logs the commit record.
    ///
    /// Once this returns the transaction's outcome is decided; under
    /// `EveryWrite` the record is durable. Returns `None` for a transaction
    /// that changed nothing.
    pub fn log_commit(&self, txn_id: TxnId) -> TxnResult<Option<Lsn>> {
        let result = {
            let txns = self.transactions.read();
            let entry = txns.get(&txn_id).ok_or(TxnError::NotFound(txn_id))?;
            let mut txn = entry.lock();
            txn.ensure_active()?;

            if txn.begin_lsn.is_none() {
                txn.state = TransactionState::Committing;
                Ok(None)
            } else {
                self.log(&mut txn, &WalRecord::commit(txn_id)).map(|lsn| {
                    txn.state = TransactionState::Committing;
                    Some(lsn)
                })
            }
        };

        if matches!(result, Err(TxnError::LogIo { .. })) {
            self.forget(txn_id);
        }
        result
    }

    /// Second phase of commit: publishes staged pages and completes
    /// deferred frees. Returns the number of pages published.
    pub fn apply_commit(&self, txn_id: TxnId) -> TxnResult<usize> {
        let published = {
            let txns = self.transactions.read();
            let mut txn = txns.get(&txn_id).ok_or(TxnError::NotFound(txn_id))?.lock();
            if txn.state != TransactionState::Committing {
                return Err(TxnError::NotActive {
                    txn_id,
                    state: txn.state,
                });
            }

            let published = self.pages.publish(txn_id);
            for &page_id in &txn.freed {
                if let Err(err) = self.pages.free(page_id) {
                    warn!(txn = %txn_id, %page_id, error = %err, "Deferred free failed");
                }
            }
            txn.state = TransactionState::Committed;
            debug!(
                txn = %txn_id,
                updates = txn.updates,
                published,
                duration_us = txn.duration().as_micros() as u64,
                "Committed transaction"
            );
            published
        };

        self.forget(txn_id);
        self.stats.committed.fetch_add(1, Ordering::Relaxed);
        Ok(published)
    }

    /// Commits a transaction: [`log_commit`] then [`apply_commit`].
    ///
    /// [`log_commit`]: TransactionManager::log_commit
    /// [`apply_commit`]: TransactionManager::apply_commit
    pub fn commit(&self, txn_id: TxnId) -> TxnResult<Option<Lsn>> {
        let lsn = self.log_commit(txn_id)?;
        self.apply_commit(txn_id)?;
        Ok(lsn)
    }

    /// Aborts a transaction.
    ///
    /// Logs an abort record if the transaction logged anything, then drops
    /// its staged pages and returns its allocations. Committed state is not
    /// touched.
    pub fn abort(&self, txn_id: TxnId) -> TxnResult<()> {
        {
            let txns = self.transactions.read();
            let mut txn = txns.get(&txn_id).ok_or(TxnError::NotFound(txn_id))?.lock();
            txn.ensure_active()?;

            if txn.begin_lsn.is_some() {
                match self.wal.append(&WalRecord::abort(txn_id)) {
                    Ok(lsn) => txn.last_lsn = Some(lsn),
                    // Without the record recovery treats the transaction as
                    // incomplete, which rolls it back all the same.
                    Err(err) => warn!(txn = %txn_id, error = %err, "Failed to log abort"),
                }
            }
            self.rollback(&mut txn);
        }

        self.forget(txn_id);
        Ok(())
    }

    fn rollback(&self, txn: &mut Transaction) {
        let discarded = self.pages.discard(txn.id);
        for &page_id in &txn.allocated {
            self.pages.release(page_id);
        }
        txn.freed.clear();
        txn.state = TransactionState::Aborted;
        self.stats.aborted.fetch_add(1, Ordering::Relaxed);
        debug!(txn = %txn.id, discarded, "Aborted transaction");
    }

    fn forget(&self, txn_id: TxnId) {
        if self.transactions.write().remove(&txn_id).is_some() {
            self.stats.active.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Lowest LSN recovery may need: the first record of any unfinished
    /// transaction, or the end of the log if there is none.
    pub fn checkpoint_floor(&self) -> Lsn {
        // Read the log end first so a transaction that begins concurrently
        // logs at or above it.
        let end = self.wal.next_lsn();
        self.transactions
            .read()
            .values()
            .filter_map(|txn| txn.lock().begin_lsn)
            .fold(end, Lsn::min)
    }
}

impl fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionManager")
            .field("active", &self.active_count())
            .field("next_txn_id", &self.next_txn_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pages::TxnPages;
    use strata_common::types::Lsn;
    use strata_storage::{BTree, CommittedView, PageStoreOptions, TreeConfig};
    use strata_wal::{RecordType, WalConfig, WalPayload};
    use tempfile::TempDir;

    const PAGE_SIZE: usize = 512;

    fn setup() -> (TempDir, TransactionManager) {
        let dir = TempDir::new().unwrap();
        let pages = PageStore::open(
            dir.path().join("pages.db"),
            PageStoreOptions::new(PAGE_SIZE, 4),
        )
        .unwrap();
        let wal = Wal::open(WalConfig::new(dir.path().join("wal"))).unwrap();
        (dir, TransactionManager::new(Arc::new(pages), Arc::new(wal)))
    }

    fn logged(manager: &TransactionManager) -> Vec<(Lsn, WalRecord)> {
        manager
            .wal()
            .read_from(Lsn::ZERO)
            .unwrap()
            .map(|entry| entry.unwrap())
            .collect()
    }

    fn types(manager: &TransactionManager) -> Vec<RecordType> {
        logged(manager)
            .into_iter()
            .map(|(_, record)| record.record_type())
            .collect()
    }

    /// Allocates and commits an empty page for later tests to write.
    fn committed_page(manager: &TransactionManager) -> PageId {
        let txn = manager.begin();
        let page_id = manager.allocate_page(txn).unwrap();
        manager
            .execute(txn, PageMutation::new(page_id, 0, vec![3u8, 0, 0]))
            .unwrap();
        manager.commit(txn).unwrap();
        page_id
    }

    #[test]
    fn test_execute_and_commit() {
        let (_dir, manager) = setup();
        let page_id = committed_page(&manager);

        let txn = manager.begin();
        let lsn = manager
            .execute(txn, PageMutation::new(page_id, 100, vec![0xBB; 2]))
            .unwrap()
            .unwrap();

        // Staged: only the owner sees it.
        assert_eq!(&manager.read_page(txn, page_id).unwrap()[100..102], &[0xBB, 0xBB]);
        assert_eq!(&manager.pages().read(page_id).unwrap()[100..102], &[0, 0]);
        assert_eq!(manager.pages().owner_of(page_id), Some(txn));

        let commit_lsn = manager.commit(txn).unwrap().unwrap();
        assert!(commit_lsn > lsn);
        assert_eq!(&manager.pages().read(page_id).unwrap()[100..102], &[0xBB, 0xBB]);
        assert_eq!(manager.pages().owner_of(page_id), None);
        assert_eq!(manager.state(txn), None);

        let records = logged(&manager);
        let (_, update) = records.iter().find(|(l, _)| *l == lsn).unwrap();
        match &update.payload {
            WalPayload::Update(payload) => {
                assert_eq!(payload.offset, 100);
                assert_eq!(&payload.before[..], &[0, 0]);
                assert_eq!(&payload.after[..], &[0xBB, 0xBB]);
            }
            other => panic!("expected update, got {:?}", other),
        }
        assert_eq!(
            types(&manager)[3..].to_vec(),
            vec![RecordType::Begin, RecordType::Update, RecordType::Commit]
        );
    }

    #[test]
    fn test_unchanged_bytes_are_not_logged() {
        let (_dir, manager) = setup();
        let page_id = committed_page(&manager);
        let before = types(&manager).len();

        let txn = manager.begin();
        let lsn = manager
            .execute(txn, PageMutation::new(page_id, 10, vec![0u8; 4]))
            .unwrap();
        assert_eq!(lsn, None);
        assert_eq!(manager.log_commit(txn).unwrap(), None);
        assert_eq!(manager.apply_commit(txn).unwrap(), 0);
        assert_eq!(types(&manager).len(), before);
    }

    #[test]
    fn test_write_conflict() {
        let (_dir, manager) = setup();
        let page_id = committed_page(&manager);

        let t1 = manager.begin();
        let t2 = manager.begin();
        manager
            .execute(t1, PageMutation::new(page_id, 8, vec![1]))
            .unwrap();

        let err = manager
            .execute(t2, PageMutation::new(page_id, 8, vec![2]))
            .unwrap_err();
        assert!(err.is_conflict());
        match err {
            TxnError::WriteConflict { owner, .. } => assert_eq!(owner, t1),
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(manager.stats().snapshot().conflicts, 1);

        manager.abort(t2).unwrap();
        manager.abort(t1).unwrap();

        let t3 = manager.begin();
        manager
            .execute(t3, PageMutation::new(page_id, 8, vec![3]))
            .unwrap();
        manager.commit(t3).unwrap();
        assert_eq!(manager.pages().read(page_id).unwrap()[8], 3);
    }

    #[test]
    fn test_abort_discards_changes() {
        let (_dir, manager) = setup();
        let page_id = committed_page(&manager);

        let txn = manager.begin();
        manager
            .execute(txn, PageMutation::new(page_id, 50, vec![9; 10]))
            .unwrap();
        let fresh = manager.allocate_page(txn).unwrap();
        assert!(manager.pages().is_allocated(fresh));

        manager.abort(txn).unwrap();
        assert_eq!(&manager.pages().read(page_id).unwrap()[50..60], &[0; 10]);
        assert!(!manager.pages().is_allocated(fresh));
        assert_eq!(types(&manager).last(), Some(&RecordType::Abort));

        let err = manager.abort(txn).unwrap_err();
        assert!(matches!(err, TxnError::NotFound(_)));
        assert_eq!(manager.stats().snapshot().aborted, 1);
    }

    #[test]
    fn test_operations_after_commit_fail() {
        let (_dir, manager) = setup();
        let txn = manager.begin();
        manager.log_commit(txn).unwrap();
        assert_eq!(manager.state(txn), Some(TransactionState::Committing));

        let err = manager.allocate_page(txn).unwrap_err();
        assert!(matches!(
            err,
            TxnError::NotActive {
                state: TransactionState::Committing,
                ..
            }
        ));
        assert!(manager.abort(txn).is_err());
        manager.apply_commit(txn).unwrap();
        assert!(matches!(
            manager.log_commit(txn),
            Err(TxnError::NotFound(_))
        ));
    }

    #[test]
    fn test_free_is_deferred_to_commit() {
        let (_dir, manager) = setup();
        let page_id = committed_page(&manager);

        let txn = manager.begin();
        manager.free_page(txn, page_id).unwrap();
        assert!(manager.pages().is_allocated(page_id));
        assert!(manager.read_page(txn, page_id).unwrap().iter().all(|&b| b == 0));

        manager.commit(txn).unwrap();
        assert!(!manager.pages().is_allocated(page_id));
        assert!(manager.free_page(manager.begin(), PageId::META).is_err());
    }

    #[test]
    fn test_log_failure_aborts_transaction() {
        let (_dir, manager) = setup();
        let page_id = committed_page(&manager);

        let txn = manager.begin();
        manager.wal().close().unwrap();
        let err = manager
            .execute(txn, PageMutation::new(page_id, 0, vec![7]))
            .unwrap_err();
        assert!(matches!(err, TxnError::LogIo { .. }));
        assert_eq!(manager.state(txn), None);
        assert_eq!(manager.pages().owner_of(page_id), None);
        assert_eq!(manager.pages().read(page_id).unwrap()[0], 3);
        assert_eq!(manager.stats().snapshot().log_failures, 1);
    }

    #[test]
    fn test_checkpoint_floor() {
        let (_dir, manager) = setup();
        let page_id = committed_page(&manager);
        assert_eq!(manager.checkpoint_floor(), manager.wal().next_lsn());

        let idle = manager.begin();
        let txn = manager.begin();
        let end = manager.wal().next_lsn();
        manager
            .execute(txn, PageMutation::new(page_id, 1, vec![1]))
            .unwrap();
        assert_eq!(manager.checkpoint_floor(), end);

        manager.commit(txn).unwrap();
        assert_eq!(manager.checkpoint_floor(), manager.wal().next_lsn());
        manager.abort(idle).unwrap();
    }

    #[test]
    fn test_tree_inside_transaction() {
        let (_dir, manager) = setup();
        let tree = BTree::new(TreeConfig::new(PAGE_SIZE, 4).unwrap());

        let txn = manager.begin();
        {
            let mut pages = TxnPages::new(&manager, txn);
            for i in 0..20u32 {
                tree.insert(&mut pages, &i.to_be_bytes(), b"v").unwrap();
            }
            assert_eq!(&tree.search(&pages, &7u32.to_be_bytes()).unwrap()[..], b"v");
        }

        // Nothing is visible outside the transaction yet.
        let committed = CommittedView(manager.pages());
        assert!(tree.search(&committed, &7u32.to_be_bytes()).is_err());

        manager.commit(txn).unwrap();
        let committed = CommittedView(manager.pages());
        assert_eq!(tree.verify(&committed).unwrap().key_count, 20);

        let txn = manager.begin();
        {
            let mut pages = TxnPages::new(&manager, txn);
            for i in 0..10u32 {
                tree.delete(&mut pages, &i.to_be_bytes()).unwrap();
            }
        }
        manager.abort(txn).unwrap();
        assert_eq!(tree.verify(&committed).unwrap().key_count, 20);
    }
}
