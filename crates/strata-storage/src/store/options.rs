//! Page store options.

use strata_common::config::StoreConfig;
use strata_common::constants::{DEFAULT_PAGE_SIZE, DEFAULT_TREE_ORDER};

/// Options used when a page file is created.
///
/// Both values are written to the metadata page. Opening an existing file
/// ignores them in favour of what the file records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageStoreOptions {
    /// Bytes per page.
    pub page_size: usize,
    /// Maximum children per internal node.
    pub tree_order: usize,
}

impl PageStoreOptions {
    /// Creates options with the given page size and tree order.
    pub fn new(page_size: usize, tree_order: usize) -> Self {
        Self {
            page_size,
            tree_order,
        }
    }
}

impl Default for PageStoreOptions {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE, DEFAULT_TREE_ORDER)
    }
}

impl From<&StoreConfig> for PageStoreOptions {
    fn from(config: &StoreConfig) -> Self {
        Self::new(config.page_size, config.tree_order)
    }
}
