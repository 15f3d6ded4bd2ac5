//! # strata-txn
//!
//! Transaction coordinator for Strata.
//!
//! - **Write-ahead**: every page change is appended to the log with its
//!   before and after images before the new page version is staged.
//! - **Page ownership**: a page staged by one transaction belongs to it
//!   until commit or abort; a second writer gets a write conflict instead of
//!   waiting.
//! - **Two-phase commit**: [`TransactionManager::log_commit`] decides the
//!   outcome, [`TransactionManager::apply_commit`] publishes the pages.
//! - **Tree access**: [`TxnPages`] lets the B+Tree run inside a
//!   transaction.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata_storage::{BTree, PageStore, PageStoreOptions, TreeConfig};
//! use strata_txn::{TransactionManager, TxnPages};
//! use strata_wal::{Wal, WalConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pages = Arc::new(PageStore::open("/tmp/strata/pages.db", PageStoreOptions::default())?);
//! let wal = Arc::new(Wal::open(WalConfig::new("/tmp/strata/wal"))?);
//! let manager = TransactionManager::new(pages, wal);
//! let tree = BTree::new(TreeConfig::new(4096, 32)?);
//!
//! let txn = manager.begin();
//! tree.insert(&mut TxnPages::new(&manager, txn), b"key", b"value")?;
//! manager.commit(txn)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod manager;
pub mod pages;

pub use error::{TxnError, TxnResult};
pub use manager::{
    PageMutation, TransactionManager, TransactionState, TransactionStats,
    TransactionStatsSnapshot,
};
pub use pages::TxnPages;
