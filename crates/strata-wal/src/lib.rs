//! # strata-wal
//!
//! Write-ahead log for Strata.
//!
//! The log is a directory of segment files named `wal_<16 hex digits>.log`.
//! Each segment starts with a small header and holds checksummed records;
//! an [`Lsn`] packs the segment number with the byte offset of a record.
//!
//! - **Records**: `Begin`, `Update` (before and after images of a page
//!   range), `Commit`, `Abort` and `Checkpoint`
//! - **Durability**: [`SyncPolicy::EveryWrite`] fsyncs every append,
//!   [`SyncPolicy::Deferred`] leaves it to [`Wal::sync`]
//! - **Repair**: opening cuts the log back to its longest intact prefix
//! - **Reclamation**: checkpoints delete segments below the redo floor
//!
//! ## Example
//!
//! ```rust,no_run
//! use strata_common::types::{PageId, TxnId};
//! use strata_wal::{Wal, WalConfig, WalRecord};
//!
//! # fn main() -> strata_wal::WalResult<()> {
//! let wal = Wal::open(WalConfig::new("/tmp/strata/wal"))?;
//! let txn = TxnId::new(1);
//! let first = wal.append(&WalRecord::begin(txn))?;
//! wal.append(&WalRecord::update(txn, PageId::new(3), 0, vec![0xAA], vec![0xBB]))?;
//! wal.append(&WalRecord::commit(txn))?;
//!
//! for entry in wal.read_from(first)? {
//!     let (lsn, record) = entry?;
//!     println!("{lsn}: {:?}", record.record_type());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`Lsn`]: strata_common::types::Lsn

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod reader;
pub mod record;
pub mod segment;
pub mod wal;
mod writer;

pub use checkpoint::{CheckpointInfo, CheckpointManager, CheckpointState};
pub use config::{SyncPolicy, WalConfig};
pub use error::{WalError, WalResult};
pub use reader::WalIter;
pub use record::{CheckpointPayload, RecordType, UpdatePayload, WalPayload, WalRecord};
pub use wal::Wal;
pub use writer::{WalStats, WalStatsSnapshot};
