//! Store-level error types.
//!
//! `StrataError` is what every public operation of the engine returns. Each
//! subsystem crate keeps its own error enum and converts into this one.

use std::fmt;
use thiserror::Error;

use crate::types::{Lsn, PageId, TxnId};

/// Stable numeric codes for [`StrataError`] variants.
///
/// The high byte names the category; codes are never renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Internal error (bug).
    Internal = 0x0001,
    /// Invalid configuration.
    InvalidConfig = 0x0006,
    /// The store has been closed.
    Closed = 0x0007,

    // I/O errors (0x0100 - 0x01FF)
    /// General I/O error.
    Io = 0x0100,
    /// Checksum verification failed.
    ChecksumMismatch = 0x0105,

    // Storage errors (0x0200 - 0x02FF)
    /// Page not found in storage.
    PageNotFound = 0x0200,
    /// Page failed its structural checks.
    PageCorrupted = 0x0201,
    /// Key not found.
    KeyNotFound = 0x0203,
    /// Key already exists.
    KeyExists = 0x0204,
    /// Key or value does not fit a node.
    EntryTooLarge = 0x0205,
    /// Buffer length differs from the page size.
    SizeMismatch = 0x0207,

    // Transaction errors (0x0300 - 0x03FF)
    /// Another transaction owns the page.
    TransactionConflict = 0x0301,
    /// Transaction is no longer active.
    TransactionNotActive = 0x0306,

    // WAL errors (0x0400 - 0x04FF)
    /// WAL is corrupted.
    WalCorrupted = 0x0400,
    /// WAL write failed.
    WalWriteFailed = 0x0401,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "I/O",
            0x02 => "Storage",
            0x03 => "Transaction",
            0x04 => "WAL",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The main error type for Strata.
///
/// # Example
///
/// ```rust
/// use strata_common::error::{StrataError, StrataResult};
/// use strata_common::types::PageId;
///
/// fn read_page(page_id: PageId) -> StrataResult<Vec<u8>> {
///     Err(StrataError::PageNotFound { page_id })
/// }
///
/// assert!(read_page(PageId::new(9)).unwrap_err().is_not_found());
/// ```
#[derive(Debug, Error)]
pub enum StrataError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// An invariant broke inside the engine.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    Config {
        /// What is wrong with it.
        reason: String,
    },

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// The operating system rejected a file operation.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Checksum mismatch on a log record or checkpoint marker.
    #[error("checksum mismatch at {lsn}: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Position of the bad record.
        lsn: Lsn,
        /// Stored checksum.
        expected: u32,
        /// Recomputed checksum.
        computed: u32,
    },

    // ==========================================================================
    // Storage Errors
    // ==========================================================================
    /// Page is not allocated.
    #[error("page {page_id} not found")]
    PageNotFound {
        /// The missing page ID.
        page_id: PageId,
    },

    /// Page failed its structural checks.
    #[error("page {page_id} is corrupted: {reason}")]
    CorruptPage {
        /// The corrupted page ID.
        page_id: PageId,
        /// Reason for corruption.
        reason: String,
    },

    /// A buffer written to a page has the wrong length.
    #[error("page size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// The page size.
        expected: usize,
        /// The buffer length.
        actual: usize,
    },

    /// Key not found.
    #[error("key not found")]
    KeyNotFound,

    /// Key already exists.
    #[error("key already exists")]
    DuplicateKey,

    /// Key/value pair does not fit a node.
    #[error("entry of {size} bytes exceeds maximum {max}")]
    EntryTooLarge {
        /// Encoded entry size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    // ==========================================================================
    // Transaction Errors
    // ==========================================================================
    /// Appending to the log failed; the transaction has been aborted.
    #[error("log write failed for transaction {txn_id}: {reason}")]
    LogIo {
        /// The aborted transaction.
        txn_id: TxnId,
        /// The underlying failure.
        reason: String,
    },

    /// The page is staged by another transaction.
    #[error("transaction {txn_id} cannot write page {page_id}: owned by transaction {owner}")]
    WriteConflict {
        /// The requesting transaction.
        txn_id: TxnId,
        /// The contended page.
        page_id: PageId,
        /// The transaction holding the page.
        owner: TxnId,
    },

    /// Operation on a finished transaction.
    #[error("transaction {txn_id} is not active (state: {state})")]
    TransactionNotActive {
        /// The transaction.
        txn_id: TxnId,
        /// Its current state.
        state: String,
    },

    // ==========================================================================
    // WAL Errors
    // ==========================================================================
    /// The log is unreadable in a way truncation cannot fix.
    #[error("WAL corrupted at {lsn}: {reason}")]
    WalCorrupted {
        /// Where the problem was found.
        lsn: Lsn,
        /// What was wrong.
        reason: String,
    },
}

impl StrataError {
    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Creates a corrupt page error.
    pub fn corrupt_page(page_id: PageId, reason: impl Into<String>) -> Self {
        Self::CorruptPage {
            page_id,
            reason: reason.into(),
        }
    }

    /// Returns the stable error code.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::Config { .. } => ErrorCode::InvalidConfig,
            Self::Closed => ErrorCode::Closed,
            Self::Io { .. } => ErrorCode::Io,
            Self::ChecksumMismatch { .. } => ErrorCode::ChecksumMismatch,
            Self::PageNotFound { .. } => ErrorCode::PageNotFound,
            Self::CorruptPage { .. } => ErrorCode::PageCorrupted,
            Self::SizeMismatch { .. } => ErrorCode::SizeMismatch,
            Self::KeyNotFound => ErrorCode::KeyNotFound,
            Self::DuplicateKey => ErrorCode::KeyExists,
            Self::EntryTooLarge { .. } => ErrorCode::EntryTooLarge,
            Self::LogIo { .. } => ErrorCode::WalWriteFailed,
            Self::WriteConflict { .. } => ErrorCode::TransactionConflict,
            Self::TransactionNotActive { .. } => ErrorCode::TransactionNotActive,
            Self::WalCorrupted { .. } => ErrorCode::WalCorrupted,
        }
    }

    /// Returns true for missing keys or pages.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound | Self::PageNotFound { .. })
    }

    /// Returns true if retrying in a fresh transaction may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WriteConflict { .. })
    }

    /// Returns true if this indicates on-disk corruption.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. } | Self::CorruptPage { .. } | Self::WalCorrupted { .. }
        )
    }
}

/// Result type alias for Strata operations.
pub type StrataResult<T> = Result<T, StrataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ErrorCode::Io.as_u16(), 0x0100);
        assert_eq!(ErrorCode::Io.category(), "I/O");
        assert_eq!(ErrorCode::KeyExists.category(), "Storage");
        assert_eq!(ErrorCode::TransactionConflict.category(), "Transaction");
        assert_eq!(ErrorCode::WalWriteFailed.category(), "WAL");
    }

    #[test]
    fn test_error_classification() {
        assert!(StrataError::KeyNotFound.is_not_found());
        assert!(StrataError::PageNotFound {
            page_id: PageId::new(1)
        }
        .is_not_found());
        assert!(!StrataError::DuplicateKey.is_not_found());

        let conflict = StrataError::WriteConflict {
            txn_id: TxnId::new(2),
            page_id: PageId::new(4),
            owner: TxnId::new(1),
        };
        assert!(conflict.is_retryable());
        assert_eq!(conflict.code(), ErrorCode::TransactionConflict);

        assert!(StrataError::corrupt_page(PageId::new(3), "bad tag").is_corruption());
    }

    #[test]
    fn test_error_display() {
        let err = StrataError::SizeMismatch {
            expected: 4096,
            actual: 100,
        };
        let msg = err.to_string();
        assert!(msg.contains("4096"));
        assert!(msg.contains("100"));

        let err = StrataError::ChecksumMismatch {
            lsn: Lsn::new(1, 16),
            expected: 0xdead_beef,
            computed: 0,
        };
        assert!(err.to_string().contains("0xdeadbeef"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StrataError = io_err.into();
        assert_eq!(err.code(), ErrorCode::Io);
    }
}
