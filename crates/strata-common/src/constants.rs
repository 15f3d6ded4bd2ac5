//! System-wide constants for Strata.
//!
//! On-disk format constants live here so that the crates writing a format
//! and the crates validating configuration against it agree.

// =============================================================================
// Page Constants
// =============================================================================

/// Default page size in bytes (4 KB).
pub const DEFAULT_PAGE_SIZE: usize = 4 * 1024;

/// Minimum page size in bytes.
pub const MIN_PAGE_SIZE: usize = 512;

/// Maximum page size in bytes (64 KB).
///
/// Node entry lengths are encoded as u16, so a page may not exceed this.
pub const MAX_PAGE_SIZE: usize = 64 * 1024;

/// Magic number stored in the metadata page ("STRA").
pub const STORE_MAGIC: u32 = 0x5354_5241;

/// Page file format version.
pub const STORE_FORMAT_VERSION: u16 = 1;

/// Name of the page file inside a store directory.
pub const PAGE_FILE_NAME: &str = "pages.db";

// =============================================================================
// B+Tree Constants
// =============================================================================

/// Default tree order (maximum children per internal node).
///
/// With the default page size this allows keys up to 506 bytes and
/// key plus value up to 506 bytes.
pub const DEFAULT_TREE_ORDER: usize = 8;

/// Minimum tree order. Below 3 a split cannot leave both halves non-empty.
pub const MIN_TREE_ORDER: usize = 3;

/// Maximum tree order.
pub const MAX_TREE_ORDER: usize = 4096;

/// Bytes before the first entry of a node page.
///
/// Leaf: tag (1) + entry count (2) + right sibling (8).
/// Internal: tag (1) + key count (2) + first child (8).
pub const NODE_HEADER_SIZE: usize = 11;

/// Per-entry overhead in a leaf: key length (2) + value length (2).
pub const LEAF_ENTRY_OVERHEAD: usize = 4;

/// Per-key overhead in an internal node: key length (2) + child pointer (8).
pub const INTERNAL_ENTRY_OVERHEAD: usize = 10;

/// Smallest key capacity a page size and order must leave room for.
pub const MIN_KEY_CAPACITY: usize = 8;

// =============================================================================
// WAL Constants
// =============================================================================

/// Default WAL segment file size limit (16 MB).
pub const DEFAULT_WAL_FILE_SIZE_LIMIT: u64 = 16 * 1024 * 1024;

/// Maximum WAL segment file size. LSN offsets are 32 bits wide.
pub const MAX_WAL_FILE_SIZE_LIMIT: u64 = u32::MAX as u64;

/// Magic number at the start of each WAL segment file ("SWAL").
pub const WAL_MAGIC: u32 = 0x5357_414C;

/// WAL format version.
pub const WAL_FORMAT_VERSION: u16 = 1;

/// Size of the header at the start of every WAL segment file.
///
/// magic (4) + version (2) + reserved (2) + segment number (4) + crc (4).
pub const WAL_SEGMENT_HEADER_SIZE: usize = 16;

/// Fixed bytes around every WAL record payload.
///
/// txn id (8) + type (1) + page ref (8) + payload length (4) + crc (4).
pub const WAL_RECORD_OVERHEAD: usize = 25;

/// Fixed bytes in an update payload besides the two images.
///
/// offset (4) + before length (4) + after length (4).
pub const WAL_UPDATE_PAYLOAD_OVERHEAD: usize = 12;

/// Name of the WAL directory inside a store directory.
pub const WAL_DIR_NAME: &str = "wal";

// =============================================================================
// Engine Constants
// =============================================================================

/// Default number of dirty committed pages that triggers a checkpoint.
pub const DEFAULT_MAX_DIRTY_PAGES: usize = 4096;

/// Default number of WAL segments written since the last checkpoint that
/// triggers another one.
pub const DEFAULT_CHECKPOINT_WAL_SEGMENTS: u32 = 4;

/// Smallest WAL segment that can hold a full-page update record.
#[must_use]
pub const fn min_wal_file_size(page_size: usize) -> u64 {
    (WAL_SEGMENT_HEADER_SIZE + WAL_RECORD_OVERHEAD + WAL_UPDATE_PAYLOAD_OVERHEAD + 2 * page_size)
        as u64
}

/// Largest key that still lets a full node of `order` fit one page.
///
/// A leaf holds up to `order` entries and an internal node up to
/// `order - 1` keys; both must fit in `page_size` at their largest.
#[must_use]
pub const fn max_key_size(page_size: usize, order: usize) -> usize {
    if order < 2 || page_size <= NODE_HEADER_SIZE {
        return 0;
    }
    let usable = page_size - NODE_HEADER_SIZE;
    let leaf = (usable / order).saturating_sub(LEAF_ENTRY_OVERHEAD);
    let internal = (usable / (order - 1)).saturating_sub(INTERNAL_ENTRY_OVERHEAD);
    if leaf < internal {
        leaf
    } else {
        internal
    }
}

/// Largest key plus value that lets a full leaf of `order` fit one page.
#[must_use]
pub const fn max_entry_size(page_size: usize, order: usize) -> usize {
    if order == 0 || page_size <= NODE_HEADER_SIZE {
        return 0;
    }
    ((page_size - NODE_HEADER_SIZE) / order).saturating_sub(LEAF_ENTRY_OVERHEAD)
}
