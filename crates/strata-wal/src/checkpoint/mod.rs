//! Checkpoint coordination.
//!
//! A checkpoint bounds recovery work and lets old segments go. It runs in
//! a fixed order:
//!
//! 1. sync the log, so every change about to be flushed is durable
//! 2. flush dirty pages to the page file
//! 3. persist the redo floor next to the pages
//! 4. log a checkpoint record and delete segments below the floor

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::info;

use strata_common::types::{Lsn, TxnId};

use crate::error::WalError;
use crate::wal::Wal;

/// Checkpoint state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointState {
    /// No checkpoint in progress.
    Idle,
    /// Syncing the log.
    Starting,
    /// Flushing dirty pages.
    InProgress,
    /// Persisting the floor and reclaiming segments.
    Completing,
}

/// Information about a completed checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointInfo {
    /// Sequence number of this checkpoint since open.
    pub sequence: u64,
    /// Redo floor recorded by the checkpoint.
    pub floor: Lsn,
    /// LSN of the checkpoint record.
    pub lsn: Lsn,
    /// Next transaction id at checkpoint time.
    pub next_txn_id: TxnId,
    /// Number of dirty pages flushed.
    pub pages_flushed: usize,
    /// Time taken to complete the checkpoint.
    pub duration: Duration,
}

/// Checkpoint manager.
///
/// Runs one checkpoint at a time and remembers the last one. A caller that
/// arrives while another checkpoint runs waits for it and then runs its own.
#[derive(Debug)]
pub struct CheckpointManager {
    run: Mutex<()>,
    state: Mutex<CheckpointState>,
    last_checkpoint: Mutex<Option<CheckpointInfo>>,
    completed: Mutex<u64>,
}

/// Puts the manager back to idle however the checkpoint ends.
struct ResetGuard<'a>(&'a Mutex<CheckpointState>);

impl Drop for ResetGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock() = CheckpointState::Idle;
    }
}

impl Default for CheckpointManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointManager {
    /// Creates a new checkpoint manager.
    pub fn new() -> Self {
        Self {
            run: Mutex::new(()),
            state: Mutex::new(CheckpointState::Idle),
            last_checkpoint: Mutex::new(None),
            completed: Mutex::new(0),
        }
    }

    /// Returns the current checkpoint state.
    pub fn state(&self) -> CheckpointState {
        *self.state.lock()
    }

    /// Returns true if a checkpoint is in progress.
    pub fn is_in_progress(&self) -> bool {
        self.state() != CheckpointState::Idle
    }

    /// Returns the last completed checkpoint info.
    pub fn last_checkpoint(&self) -> Option<CheckpointInfo> {
        self.last_checkpoint.lock().clone()
    }

    /// Performs a checkpoint.
    ///
    /// `floor` must not exceed the first LSN of any transaction still
    /// running. `flush_pages` writes every dirty page and returns how many
    /// it wrote; `persist_floor` stores the floor where recovery will find
    /// it.
    ///
    /// Blocks while another checkpoint is running.
    pub fn checkpoint<E>(
        &self,
        wal: &Wal,
        floor: Lsn,
        next_txn_id: TxnId,
        flush_pages: impl FnOnce() -> Result<usize, E>,
        persist_floor: impl FnOnce(Lsn, TxnId) -> Result<(), E>,
    ) -> Result<CheckpointInfo, E>
    where
        E: From<WalError>,
    {
        let _running = self.run.lock();
        let start = Instant::now();

        *self.state.lock() = CheckpointState::Starting;
        let _reset = ResetGuard(&self.state);

        wal.sync()?;

        *self.state.lock() = CheckpointState::InProgress;
        let pages_flushed = flush_pages()?;

        *self.state.lock() = CheckpointState::Completing;
        persist_floor(floor, next_txn_id)?;
        let lsn = wal.checkpoint(floor, next_txn_id)?;

        let sequence = {
            let mut completed = self.completed.lock();
            *completed += 1;
            *completed
        };
        let info = CheckpointInfo {
            sequence,
            floor,
            lsn,
            next_txn_id,
            pages_flushed,
            duration: start.elapsed(),
        };

        info!(
            sequence,
            %floor,
            pages_flushed,
            duration_ms = info.duration.as_millis() as u64,
            "Checkpoint complete"
        );

        *self.last_checkpoint.lock() = Some(info.clone());
        Ok(info)
    }
}
