//! Page access traits used by the tree.
//!
//! The tree never touches a [`PageStore`] directly. Readers go through
//! [`PageReader`]; every structural change goes through [`PageProvider`], so
//! the transaction layer can log each page write before it takes effect.

use std::collections::HashMap;

use bytes::Bytes;

use strata_common::types::PageId;

use super::error::TreeError;
use crate::store::{PageStore, StorageError};

/// Read access to tree pages.
pub trait PageReader {
    /// Error type of the page source. Tree errors convert into it.
    type Error: From<TreeError>;

    /// Page size in bytes.
    fn page_size(&self) -> usize;

    /// Current root page, or `PageId::INVALID` for an empty tree.
    fn root(&self) -> Result<PageId, Self::Error>;

    /// Reads a whole page.
    fn read_page(&self, page_id: PageId) -> Result<Bytes, Self::Error>;
}

/// Read-write access to tree pages.
pub trait PageProvider: PageReader {
    /// Replaces a whole page.
    fn write_page(&mut self, page_id: PageId, data: Vec<u8>) -> Result<(), Self::Error>;

    /// Allocates a fresh zeroed page.
    fn allocate_page(&mut self) -> Result<PageId, Self::Error>;

    /// Frees a page that is no longer part of the tree.
    fn free_page(&mut self, page_id: PageId) -> Result<(), Self::Error>;

    /// Points the tree at a new root.
    fn set_root(&mut self, root: PageId) -> Result<(), Self::Error>;
}

/// Read-only view of the committed pages of a [`PageStore`].
#[derive(Debug, Clone, Copy)]
pub struct CommittedView<'a>(pub &'a PageStore);

impl PageReader for CommittedView<'_> {
    type Error = TreeError;

    fn page_size(&self) -> usize {
        self.0.page_size()
    }

    fn root(&self) -> Result<PageId, TreeError> {
        Ok(self.0.root()?)
    }

    fn read_page(&self, page_id: PageId) -> Result<Bytes, TreeError> {
        Ok(self.0.read(page_id)?)
    }
}

/// In-memory pages, for exercising the tree without a page file.
#[derive(Debug)]
pub struct MemoryPages {
    page_size: usize,
    root: PageId,
    pages: HashMap<PageId, Bytes>,
    free: Vec<PageId>,
    next_page: u64,
}

impl MemoryPages {
    /// Creates an empty page set.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            root: PageId::INVALID,
            pages: HashMap::new(),
            free: Vec::new(),
            next_page: 1,
        }
    }

    /// Number of live pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

impl PageReader for MemoryPages {
    type Error = TreeError;

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn root(&self) -> Result<PageId, TreeError> {
        Ok(self.root)
    }

    fn read_page(&self, page_id: PageId) -> Result<Bytes, TreeError> {
        self.pages
            .get(&page_id)
            .cloned()
            .ok_or(TreeError::Storage(StorageError::PageNotFound { page_id }))
    }
}

impl PageProvider for MemoryPages {
    fn write_page(&mut self, page_id: PageId, data: Vec<u8>) -> Result<(), TreeError> {
        if data.len() != self.page_size {
            return Err(StorageError::SizeMismatch {
                expected: self.page_size,
                actual: data.len(),
            }
            .into());
        }
        if !self.pages.contains_key(&page_id) {
            return Err(StorageError::PageNotFound { page_id }.into());
        }
        self.pages.insert(page_id, Bytes::from(data));
        Ok(())
    }

    fn allocate_page(&mut self) -> Result<PageId, TreeError> {
        let page_id = self.free.pop().unwrap_or_else(|| {
            let page_id = PageId::new(self.next_page);
            self.next_page += 1;
            page_id
        });
        self.pages
            .insert(page_id, Bytes::from(vec![0u8; self.page_size]));
        Ok(page_id)
    }

    fn free_page(&mut self, page_id: PageId) -> Result<(), TreeError> {
        if self.pages.remove(&page_id).is_none() {
            return Err(StorageError::PageNotFound { page_id }.into());
        }
        self.free.push(page_id);
        Ok(())
    }

    fn set_root(&mut self, root: PageId) -> Result<(), TreeError> {
        self.root = root;
        Ok(())
    }
}
