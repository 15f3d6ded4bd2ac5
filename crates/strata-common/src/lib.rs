//! # strata-common
//!
//! Common types, errors, and configuration for Strata.
//!
//! This crate provides the foundational pieces used across all Strata
//! components:
//!
//! - **Types**: identifiers (`PageId`, `TxnId`, `Lsn`)
//! - **Errors**: the public `StrataError` taxonomy with stable codes
//! - **Config**: `StoreConfig`, loadable from TOML
//! - **Constants**: on-disk format constants and defaults
//!
//! ## Example
//!
//! ```rust
//! use strata_common::config::StoreConfig;
//! use strata_common::types::{Lsn, PageId};
//!
//! let config = StoreConfig::default().with_tree_order(8);
//! assert!(config.validate().is_ok());
//!
//! let lsn = Lsn::new(0, 16);
//! assert_eq!(lsn.segment(), 0);
//! let _root = PageId::new(1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

// Re-export commonly used items at the crate root
pub use config::StoreConfig;
pub use constants::*;
pub use error::{ErrorCode, StrataError, StrataResult};
pub use types::{Lsn, PageId, TxnId};
