//! # strata-storage
//!
//! Page store and B+Tree index for Strata.
//!
//! - [`store::PageStore`] hands out fixed-size pages backed by a single file.
//!   Writes are buffered in memory until an explicit flush, so the write-ahead
//!   log stays the only durability boundary.
//! - [`btree::BTree`] is an ordered index over those pages. It reaches pages
//!   only through the [`btree::PageReader`] and [`btree::PageProvider`]
//!   traits, which lets the transaction layer log every page write before it
//!   happens.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Page formats: page types, the metadata page, checksums
pub mod page;

/// File-backed page store
pub mod store;

/// B+Tree index
pub mod btree;

pub use btree::{
    BTree, CommittedView, KeyRange, MemoryPages, PageProvider, PageReader, TreeConfig, TreeError,
    TreeResult, TreeStats,
};
pub use store::{PageStore, PageStoreOptions, PageStoreStats, StorageError, StorageResult};
