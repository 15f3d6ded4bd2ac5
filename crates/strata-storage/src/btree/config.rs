//! Node sizing derived from page size and tree order.

use strata_common::config::StoreConfig;
use strata_common::constants::{
    max_entry_size, max_key_size, MIN_KEY_CAPACITY, MIN_TREE_ORDER,
};

use super::error::{TreeError, TreeResult};

/// Configuration for a B+Tree.
///
/// With order `M`, a leaf holds at most `M` entries and an internal node at
/// most `M` children. Entry limits are chosen so that a full node of either
/// kind always fits in one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    page_size: usize,
    order: usize,
    allow_overwrite: bool,
    max_key_size: usize,
    max_entry_size: usize,
}

impl TreeConfig {
    /// Creates a configuration, rejecting page size and order combinations
    /// that leave no room for keys.
    pub fn new(page_size: usize, order: usize) -> TreeResult<Self> {
        if order < MIN_TREE_ORDER {
            return Err(TreeError::InvalidConfig(format!(
                "order {order} is below the minimum of {MIN_TREE_ORDER}"
            )));
        }

        let max_key = max_key_size(page_size, order);
        if max_key < MIN_KEY_CAPACITY {
            return Err(TreeError::InvalidConfig(format!(
                "order {order} leaves {max_key} key bytes in {page_size}-byte pages"
            )));
        }

        Ok(Self {
            page_size,
            order,
            allow_overwrite: false,
            max_key_size: max_key,
            max_entry_size: max_entry_size(page_size, order),
        })
    }

    /// Creates a configuration from store settings.
    pub fn from_store_config(config: &StoreConfig) -> TreeResult<Self> {
        Ok(Self::new(config.page_size, config.tree_order)?
            .with_allow_overwrite(config.allow_overwrite))
    }

    /// Sets whether inserting an existing key replaces its value.
    #[must_use]
    pub fn with_allow_overwrite(mut self, allow: bool) -> Self {
        self.allow_overwrite = allow;
        self
    }

    /// Page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// The tree order.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Whether inserts overwrite existing keys.
    pub fn allow_overwrite(&self) -> bool {
        self.allow_overwrite
    }

    /// Maximum key length in bytes.
    pub fn max_key_size(&self) -> usize {
        self.max_key_size
    }

    /// Maximum combined key and value length in bytes.
    pub fn max_entry_size(&self) -> usize {
        self.max_entry_size
    }

    /// Maximum entries in a leaf.
    pub fn leaf_max_entries(&self) -> usize {
        self.order
    }

    /// Minimum entries in a non-root leaf.
    pub fn leaf_min_entries(&self) -> usize {
        self.order.div_ceil(2) - 1
    }

    /// Maximum children of an internal node.
    pub fn internal_max_children(&self) -> usize {
        self.order
    }

    /// Minimum children of a non-root internal node.
    pub fn internal_min_children(&self) -> usize {
        self.order.div_ceil(2)
    }

    /// Checks that a key/value pair fits a node.
    pub fn check_entry(&self, key: &[u8], value: &[u8]) -> TreeResult<()> {
        if key.len() > self.max_key_size {
            return Err(TreeError::EntryTooLarge {
                size: key.len(),
                max: self.max_key_size,
            });
        }
        let size = key.len() + value.len();
        if size > self.max_entry_size() {
            return Err(TreeError::EntryTooLarge {
                size,
                max: self.max_entry_size(),
            });
        }
        Ok(())
    }
}
