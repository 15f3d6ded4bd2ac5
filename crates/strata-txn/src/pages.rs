//! Tree access through a transaction.

use bytes::Bytes;

use strata_common::types::{PageId, TxnId};
use strata_storage::page::meta::ROOT_OFFSET;
use strata_storage::page::MetaPage;
use strata_storage::{PageProvider, PageReader, StorageError};

use crate::error::{TxnError, TxnResult};
use crate::manager::{PageMutation, TransactionManager};

/// The pages of a store as one transaction sees them.
///
/// Reads return the transaction's own staged versions. Every write becomes a
/// logged [`PageMutation`] covering just the bytes that changed.
#[derive(Debug, Clone, Copy)]
pub struct TxnPages<'a> {
    manager: &'a TransactionManager,
    txn_id: TxnId,
}

impl<'a> TxnPages<'a> {
    /// Creates a view for `txn_id`.
    pub fn new(manager: &'a TransactionManager, txn_id: TxnId) -> Self {
        Self { manager, txn_id }
    }
}

impl PageReader for TxnPages<'_> {
    type Error = TxnError;

    fn page_size(&self) -> usize {
        self.manager.pages().page_size()
    }

    fn root(&self) -> TxnResult<PageId> {
        let meta = self.manager.read_page(self.txn_id, PageId::META)?;
        Ok(MetaPage::read_root(&meta)?)
    }

    fn read_page(&self, page_id: PageId) -> TxnResult<Bytes> {
        self.manager.read_page(self.txn_id, page_id)
    }
}

impl PageProvider for TxnPages<'_> {
    fn write_page(&mut self, page_id: PageId, data: Vec<u8>) -> TxnResult<()> {
        let current = self.manager.claim(self.txn_id, page_id)?;
        if current.len() != data.len() {
            return Err(StorageError::SizeMismatch {
                expected: current.len(),
                actual: data.len(),
            }
            .into());
        }

        let Some((first, last)) = changed_range(&current, &data) else {
            return Ok(());
        };
        let changed = Bytes::from(data).slice(first..=last);
        self.manager
            .execute(self.txn_id, PageMutation::new(page_id, first, changed))?;
        Ok(())
    }

    fn allocate_page(&mut self) -> TxnResult<PageId> {
        self.manager.allocate_page(self.txn_id)
    }

    fn free_page(&mut self, page_id: PageId) -> TxnResult<()> {
        self.manager.free_page(self.txn_id, page_id)
    }

    fn set_root(&mut self, root: PageId) -> TxnResult<()> {
        let mutation = PageMutation::new(
            PageId::META,
            ROOT_OFFSET,
            MetaPage::encode_root(root).to_vec(),
        );
        self.manager.execute(self.txn_id, mutation)?;
        Ok(())
    }
}

/// First and last differing byte of two equally long pages.
fn changed_range(old: &[u8], new: &[u8]) -> Option<(usize, usize)> {
    let first = old.iter().zip(new).position(|(a, b)| a != b)?;
    let last = old.iter().zip(new).rposition(|(a, b)| a != b)?;
    Some((first, last))
}
