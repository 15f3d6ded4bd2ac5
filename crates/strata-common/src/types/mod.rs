//! Core types for Strata.

mod ids;

pub use ids::{Lsn, PageId, TxnId};
