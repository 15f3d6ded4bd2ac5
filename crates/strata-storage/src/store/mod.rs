//! Page storage.
//!
//! [`PageStore`] owns the page file. It buffers committed writes until
//! [`PageStore::flush`], keeps per-transaction staged copies of pages, and
//! tracks which pages are free.

mod error;
mod options;
mod page_store;

pub use error::{StorageError, StorageResult};
pub use options::PageStoreOptions;
pub use page_store::{PageStore, PageStoreStats};
