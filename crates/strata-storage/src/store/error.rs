//! Page store error types.

use std::io;
use thiserror::Error;

use strata_common::error::StrataError;
use strata_common::types::{Lsn, PageId, TxnId};

/// Result type for page store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in page store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error on the page file.
    #[error("page file I/O error: {source}")]
    Io {
        /// The underlying error.
        #[from]
        source: io::Error,
    },

    /// Page is not allocated.
    #[error("page not found: {page_id}")]
    PageNotFound {
        /// The requested page.
        page_id: PageId,
    },

    /// Buffer length differs from the page size.
    #[error("page size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// The page size.
        expected: usize,
        /// The buffer length.
        actual: usize,
    },

    /// A byte range falls outside the page.
    #[error("range {offset}+{len} is outside page {page_id} of {page_size} bytes")]
    OutOfBounds {
        /// The page.
        page_id: PageId,
        /// Start of the range.
        offset: usize,
        /// Length of the range.
        len: usize,
        /// The page size.
        page_size: usize,
    },

    /// The metadata page is unreadable.
    #[error("invalid metadata page: {reason}")]
    InvalidMeta {
        /// What is wrong with it.
        reason: String,
    },

    /// The checkpoint marker failed its checksum.
    #[error("checkpoint marker checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    CheckpointChecksum {
        /// Stored checksum.
        stored: u32,
        /// Recomputed checksum.
        computed: u32,
    },

    /// Another transaction has staged writes to the page.
    #[error("page {page_id} is owned by transaction {owner}, not {requester}")]
    PageOwned {
        /// The contended page.
        page_id: PageId,
        /// The transaction holding it.
        owner: TxnId,
        /// The transaction asking for it.
        requester: TxnId,
    },

    /// A staged write for a page that was never claimed.
    #[error("transaction {txn_id} has not claimed page {page_id}")]
    NotClaimed {
        /// The transaction.
        txn_id: TxnId,
        /// The page.
        page_id: PageId,
    },

    /// The metadata page cannot be freed.
    #[error("the metadata page cannot be freed")]
    MetaPageFree,
}

impl StorageError {
    /// Creates an invalid metadata error.
    pub fn invalid_meta(reason: impl Into<String>) -> Self {
        Self::InvalidMeta {
            reason: reason.into(),
        }
    }

    /// Returns true if this error indicates on-disk corruption.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::InvalidMeta { .. } | Self::CheckpointChecksum { .. }
        )
    }
}

impl From<StorageError> for StrataError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io { source } => StrataError::Io { source },
            StorageError::PageNotFound { page_id } => StrataError::PageNotFound { page_id },
            StorageError::SizeMismatch { expected, actual } => {
                StrataError::SizeMismatch { expected, actual }
            }
            StorageError::OutOfBounds {
                offset,
                len,
                page_size,
                ..
            } => StrataError::SizeMismatch {
                expected: page_size,
                actual: offset + len,
            },
            StorageError::InvalidMeta { reason } => {
                StrataError::corrupt_page(PageId::META, reason)
            }
            StorageError::CheckpointChecksum { stored, computed } => {
                StrataError::ChecksumMismatch {
                    lsn: Lsn::ZERO,
                    expected: stored,
                    computed,
                }
            }
            StorageError::PageOwned {
                page_id,
                owner,
                requester,
            } => StrataError::WriteConflict {
                txn_id: requester,
                page_id,
                owner,
            },
            err @ (StorageError::NotClaimed { .. } | StorageError::MetaPageFree) => {
                StrataError::internal(err.to_string())
            }
        }
    }
}
