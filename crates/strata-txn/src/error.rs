//! Transaction error types.

use thiserror::Error;

use strata_common::error::StrataError;
use strata_common::types::{PageId, TxnId};
use strata_storage::{StorageError, TreeError};
use strata_wal::WalError;

use crate::manager::TransactionState;

/// Result type for transaction operations.
pub type TxnResult<T> = Result<T, TxnError>;

/// Errors that can occur during transaction operations.
#[derive(Debug, Error)]
pub enum TxnError {
    /// Transaction not found. It never existed or has already finished.
    #[error("transaction not found: {0}")]
    NotFound(TxnId),

    /// Transaction is not in a state that allows the operation.
    #[error("transaction {txn_id} is {state}")]
    NotActive {
        /// The transaction ID.
        txn_id: TxnId,
        /// Its current state.
        state: TransactionState,
    },

    /// Another transaction owns the page.
    #[error("transaction {txn_id} conflicts with transaction {owner} on page {page_id}")]
    WriteConflict {
        /// The requesting transaction.
        txn_id: TxnId,
        /// The contended page.
        page_id: PageId,
        /// The transaction holding the page.
        owner: TxnId,
    },

    /// Appending to the log failed and the transaction was aborted.
    #[error("log write failed, transaction {txn_id} aborted: {source}")]
    LogIo {
        /// The aborted transaction.
        txn_id: TxnId,
        /// The append failure.
        source: WalError,
    },

    /// Page store error.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// B+Tree error.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// WAL error outside a transaction's own appends.
    #[error(transparent)]
    Wal(#[from] WalError),
}

impl TxnError {
    /// Returns true if the transaction lost a page to another writer.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::WriteConflict { .. } | Self::Storage(StorageError::PageOwned { .. })
        )
    }
}

impl From<TxnError> for StrataError {
    fn from(err: TxnError) -> Self {
        match err {
            TxnError::NotFound(txn_id) => StrataError::TransactionNotActive {
                txn_id,
                state: "finished".to_string(),
            },
            TxnError::NotActive { txn_id, state } => StrataError::TransactionNotActive {
                txn_id,
                state: state.to_string(),
            },
            TxnError::WriteConflict {
                txn_id,
                page_id,
                owner,
            } => StrataError::WriteConflict {
                txn_id,
                page_id,
                owner,
            },
            TxnError::LogIo { txn_id, source } => StrataError::LogIo {
                txn_id,
                reason: source.to_string(),
            },
            TxnError::Storage(err) => err.into(),
            TxnError::Tree(err) => err.into(),
            TxnError::Wal(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::error::ErrorCode;

    #[test]
    fn test_conversion() {
        let err = TxnError::WriteConflict {
            txn_id: TxnId::new(2),
            page_id: PageId::new(3),
            owner: TxnId::new(1),
        };
        assert!(err.is_conflict());
        assert_eq!(StrataError::from(err).code(), ErrorCode::TransactionConflict);

        let err = TxnError::LogIo {
            txn_id: TxnId::new(1),
            source: WalError::Closed,
        };
        assert_eq!(StrataError::from(err).code(), ErrorCode::WalWriteFailed);

        let err = TxnError::Tree(TreeError::KeyNotFound);
        assert!(StrataError::from(err).is_not_found());

        let err = TxnError::NotActive {
            txn_id: TxnId::new(4),
            state: TransactionState::Committed,
        };
        let err = StrataError::from(err);
        assert_eq!(err.code(), ErrorCode::TransactionNotActive);
        assert!(err.to_string().contains("Committed"));
    }
}
