//! B+Tree index over fixed-size pages.
//!
//! ## Structure
//!
//! ```text
//!                  [ 10 | 17 ]              internal: separators + children
//!                 /     |     \
//!         [5 6 7] -> [10 12] -> [17 20 30]  leaves: entries + sibling links
//! ```
//!
//! With order `M`, leaves hold at most `M` entries and internal nodes at most
//! `M` children. A key equal to a separator lives in the right subtree.
//!
//! ## Usage
//!
//! ```rust
//! use strata_storage::btree::{BTree, KeyRange, MemoryPages, TreeConfig};
//!
//! let tree = BTree::new(TreeConfig::new(512, 4).unwrap());
//! let mut pages = MemoryPages::new(512);
//!
//! tree.insert(&mut pages, b"user:1", b"Alice").unwrap();
//! tree.insert(&mut pages, b"user:2", b"Bob").unwrap();
//!
//! assert_eq!(tree.search(&pages, b"user:1").unwrap().as_ref(), b"Alice");
//! assert_eq!(tree.scan(&pages, &KeyRange::prefix(&b"user:"[..])).unwrap().len(), 2);
//!
//! tree.delete(&mut pages, b"user:2").unwrap();
//! ```

mod config;
mod cursor;
mod error;
mod node;
mod provider;
mod tree;

pub use config::TreeConfig;
pub use cursor::KeyRange;
pub use error::{TreeError, TreeResult};
pub use node::{InternalNode, LeafEntry, LeafNode, Node};
pub use provider::{CommittedView, MemoryPages, PageProvider, PageReader};
pub use tree::{BTree, TreeStats};
