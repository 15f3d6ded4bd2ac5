//! # strata-engine
//!
//! The durable key-value store built from the lower layers:
//!
//! - [`Store`] opens a store directory, runs crash recovery and exposes
//!   auto-commit reads and writes.
//! - [`Transaction`] groups writes that commit or abort together.
//! - [`recovery`] replays the write-ahead log after a crash.
//!
//! ## Durability
//!
//! With `sync_on_commit` enabled (the default) a commit returns only after
//! its commit record is on disk. Page images reach the page file at
//! checkpoints, which also delete log segments below the recovery floor.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod recovery;
mod store;

pub use recovery::{RecoveryManager, RecoveryReport, RecoveryState};
pub use store::{Store, StoreStats, Transaction};

pub use strata_common::{StoreConfig, StrataError, StrataResult};
pub use strata_storage::{KeyRange, TreeStats};
pub use strata_wal::CheckpointInfo;
