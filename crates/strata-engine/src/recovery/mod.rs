//! Crash recovery.
//!
//! Recovery replays the log from the durable checkpoint floor:
//!
//! ```text
//! Idle ──▶ Scanning ──▶ Redoing ──▶ UndoingIncomplete ──▶ Ready
//!             │             ▲
//!             ▼             │
//!           Failed ─────────┘   (unreadable marker: rescan the whole log)
//! ```
//!
//! The log is read twice, never held in memory: an analysis pass finds
//! each transaction's outcome, then committed transactions are redone in
//! LSN order and transactions with no terminal record are undone in
//! reverse LSN order. Both passes write physical images, so running
//! recovery again is harmless.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use strata_common::error::{StrataError, StrataResult};
use strata_common::types::{Lsn, PageId, TxnId};
use strata_storage::page::CheckpointMarker;
use strata_storage::PageStore;
use strata_wal::{CheckpointManager, UpdatePayload, Wal, WalPayload, WalRecord};

/// Recovery progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    /// Not started.
    Idle,
    /// Reading the checkpoint marker and the log.
    Scanning,
    /// The checkpoint marker was unreadable; the whole log is scanned.
    Failed,
    /// Re-applying committed changes.
    Redoing,
    /// Rolling back transactions that never finished.
    UndoingIncomplete,
    /// Done; the store is consistent.
    Ready,
}

impl fmt::Display for RecoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecoveryState::Idle => "idle",
            RecoveryState::Scanning => "scanning",
            RecoveryState::Failed => "failed",
            RecoveryState::Redoing => "redoing",
            RecoveryState::UndoingIncomplete => "undoing incomplete",
            RecoveryState::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// What recovery found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// LSN the scan started from.
    pub floor: Lsn,
    /// Records read from the log.
    pub records_scanned: u64,
    /// After-images re-applied.
    pub redo_applied: u64,
    /// Before-images restored.
    pub undo_applied: u64,
    /// Transactions found committed.
    pub committed: usize,
    /// Transactions found aborted.
    pub aborted: usize,
    /// Transactions rolled back because they never finished.
    pub rolled_back: Vec<TxnId>,
    /// True if the checkpoint marker was unreadable.
    pub fell_back: bool,
    /// Where the log was found damaged, if it was.
    pub torn_at: Option<Lsn>,
    /// First transaction id safe to hand out.
    pub next_txn_id: TxnId,
    /// Time spent.
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Committed,
    Aborted,
}

/// Brings the page store back in line with the log.
pub struct RecoveryManager<'a> {
    pages: &'a PageStore,
    wal: &'a Wal,
    checkpointer: &'a CheckpointManager,
    state: RecoveryState,
}

impl<'a> RecoveryManager<'a> {
    /// Creates a recovery manager.
    pub fn new(pages: &'a PageStore, wal: &'a Wal, checkpointer: &'a CheckpointManager) -> Self {
        Self {
            pages,
            wal,
            checkpointer,
            state: RecoveryState::Idle,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> RecoveryState {
        self.state
    }

    fn transition(&mut self, next: RecoveryState) {
        debug!(from = %self.state, to = %next, "Recovery state change");
        self.state = next;
    }

    /// Runs recovery to completion and checkpoints the result.
    pub fn run(&mut self) -> StrataResult<RecoveryReport> {
        let start = Instant::now();
        let mut report = RecoveryReport {
            torn_at: self.wal.truncated_at(),
            ..RecoveryReport::default()
        };

        self.transition(RecoveryState::Scanning);
        let marker = match self.pages.read_checkpoint() {
            Ok(marker) => marker,
            Err(err) if err.is_corruption() => {
                warn!(error = %err, "Checkpoint marker unreadable, scanning the whole log");
                self.transition(RecoveryState::Failed);
                report.fell_back = true;
                CheckpointMarker::INITIAL
            }
            Err(err) => return Err(err.into()),
        };
        report.floor = marker.floor;

        // Analysis: learn each transaction's outcome without keeping records.
        let mut next_txn = marker.next_txn_id.max(TxnId::MIN);
        let mut outcomes = HashMap::new();
        let mut seen = BTreeSet::new();
        let mut iter = self.wal.read_from(marker.floor)?;
        for entry in iter.by_ref() {
            let (_, record) = entry?;
            report.records_scanned += 1;
            match &record.payload {
                WalPayload::Commit => {
                    outcomes.insert(record.txn_id, Outcome::Committed);
                }
                WalPayload::Abort => {
                    outcomes.insert(record.txn_id, Outcome::Aborted);
                }
                WalPayload::Checkpoint(payload) => {
                    next_txn = next_txn.max(payload.next_txn_id);
                }
                WalPayload::Begin | WalPayload::Update(_) => {}
            }
            if record.txn_id.is_valid() {
                seen.insert(record.txn_id);
                next_txn = next_txn.max(record.txn_id.next());
            }
        }
        if let Some(torn) = iter.torn_at() {
            report.torn_at.get_or_insert(torn);
        }
        report.committed = outcomes
            .values()
            .filter(|o| **o == Outcome::Committed)
            .count();
        report.aborted = outcomes.len() - report.committed;
        report.next_txn_id = next_txn;

        // Redo streams the log a second time. Only updates of unfinished
        // transactions are kept, for the undo pass.
        self.transition(RecoveryState::Redoing);
        let mut last_committed: HashMap<PageId, Lsn> = HashMap::new();
        let mut unfinished: Vec<(Lsn, PageId, UpdatePayload)> = Vec::new();
        let records = self
            .wal
            .read_from(marker.floor)?
            .take(report.records_scanned as usize);
        for entry in records {
            let (lsn, record) = entry?;
            let WalPayload::Update(update) = record.payload else {
                continue;
            };
            match outcomes.get(&record.txn_id) {
                Some(Outcome::Committed) => {
                    self.pages
                        .apply_image(record.page_id, update.offset as usize, &update.after, lsn)?;
                    last_committed.insert(record.page_id, lsn);
                    report.redo_applied += 1;
                }
                Some(Outcome::Aborted) => {}
                None => unfinished.push((lsn, record.page_id, update)),
            }
        }

        self.transition(RecoveryState::UndoingIncomplete);
        let incomplete: Vec<TxnId> = seen
            .into_iter()
            .filter(|txn| !outcomes.contains_key(txn))
            .collect();
        for (lsn, page_id, update) in unfinished.iter().rev() {
            // A later committed write to the page was built without this
            // change, which was never published.
            if last_committed
                .get(page_id)
                .is_some_and(|committed| committed > lsn)
            {
                continue;
            }
            self.pages
                .apply_image(*page_id, update.offset as usize, &update.before, *lsn)?;
            report.undo_applied += 1;
        }
        for &txn in &incomplete {
            self.wal.append(&WalRecord::abort(txn))?;
        }
        report.rolled_back = incomplete;

        self.wal.sync()?;
        let floor = self.wal.next_lsn();
        let pages = self.pages;
        self.checkpointer.checkpoint(
            self.wal,
            floor,
            next_txn,
            || pages.flush().map_err(StrataError::from),
            |floor, next_txn_id| {
                pages
                    .write_checkpoint(CheckpointMarker { floor, next_txn_id })
                    .map_err(StrataError::from)
            },
        )?;

        self.transition(RecoveryState::Ready);
        report.elapsed = start.elapsed();
        info!(
            floor = %report.floor,
            records = report.records_scanned,
            redo = report.redo_applied,
            undo = report.undo_applied,
            rolled_back = report.rolled_back.len(),
            fell_back = report.fell_back,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Recovery complete"
        );
        Ok(report)
    }
}

impl fmt::Debug for RecoveryManager<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryManager")
            .field("state", &self.state)
            .finish()
    }
}
