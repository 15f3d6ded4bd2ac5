//! Error types for the B+Tree index.

use strata_common::error::StrataError;
use strata_common::types::PageId;
use thiserror::Error;

use crate::store::StorageError;

/// Result type for B+Tree operations.
pub type TreeResult<T> = Result<T, TreeError>;

/// Errors that can occur in B+Tree operations.
#[derive(Debug, Error)]
pub enum TreeError {
    /// Key not found in the tree.
    #[error("key not found")]
    KeyNotFound,

    /// Duplicate key found during insert.
    #[error("duplicate key")]
    DuplicateKey,

    /// Key or key/value pair too large for a node.
    #[error("entry too large: {size} bytes (max: {max})")]
    EntryTooLarge {
        /// Size of the offending key or entry.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// A page failed node decoding.
    #[error("corrupted page: {page_id}, reason: {reason}")]
    CorruptPage {
        /// The corrupted page ID.
        page_id: PageId,
        /// Description of corruption.
        reason: String,
    },

    /// A node does not fit in its page.
    #[error("node overflow: page {page_id} needs {size} bytes (page size: {page_size})")]
    NodeOverflow {
        /// The node's page.
        page_id: PageId,
        /// Encoded size.
        size: usize,
        /// The page size.
        page_size: usize,
    },

    /// Page size and order admit no usable node layout.
    #[error("invalid tree configuration: {0}")]
    InvalidConfig(String),

    /// A structural invariant does not hold.
    #[error("tree invariant violated: {0}")]
    InvariantViolation(String),

    /// Page store error.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TreeError {
    /// Creates a new corrupted page error.
    pub fn corrupt(page_id: PageId, reason: impl Into<String>) -> Self {
        Self::CorruptPage {
            page_id,
            reason: reason.into(),
        }
    }

    /// Creates a new invariant violation.
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}

impl From<TreeError> for StrataError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::KeyNotFound => StrataError::KeyNotFound,
            TreeError::DuplicateKey => StrataError::DuplicateKey,
            TreeError::EntryTooLarge { size, max } => StrataError::EntryTooLarge { size, max },
            TreeError::CorruptPage { page_id, reason } => {
                StrataError::CorruptPage { page_id, reason }
            }
            TreeError::InvalidConfig(reason) => StrataError::Config { reason },
            TreeError::Storage(err) => err.into(),
            err @ (TreeError::NodeOverflow { .. } | TreeError::InvariantViolation(_)) => {
                StrataError::internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::error::ErrorCode;

    #[test]
    fn test_error_display() {
        let err = TreeError::EntryTooLarge {
            size: 300,
            max: 121,
        };
        assert!(err.to_string().contains("300"));
        assert!(err.to_string().contains("121"));

        let err = TreeError::corrupt(PageId::new(42), "unknown tag 9");
        assert!(err.to_string().contains("42"));
        assert!(err.to_string().contains("unknown tag 9"));
    }

    #[test]
    fn test_conversion() {
        assert_eq!(
            StrataError::from(TreeError::DuplicateKey).code(),
            ErrorCode::KeyExists
        );
        assert!(StrataError::from(TreeError::KeyNotFound).is_not_found());

        let err: StrataError = TreeError::Storage(StorageError::PageNotFound {
            page_id: PageId::new(7),
        })
        .into();
        assert_eq!(err.code(), ErrorCode::PageNotFound);
    }
}
