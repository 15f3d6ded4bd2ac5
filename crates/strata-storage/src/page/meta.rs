//! Metadata page layout.
//!
//! Page 0 has two independently written regions:
//!
//! ```text
//! +-----+-------+---------+-----------+-------+------------+------------+
//! | tag | magic | version | page size | order | header crc | root page  |
//! | 1B  | 4B    | 2B      | 4B        | 4B    | 4B         | 8B         |
//! +-----+-------+---------+-----------+-------+------------+------------+
//! 0     1       5         7           11      15           19           27
//!
//! at CHECKPOINT_OFFSET (64):
//! +------------+-------------+-----+
//! | floor LSN  | next txn id | crc |
//! | 8B         | 8B          | 4B  |
//! +------------+-------------+-----+
//! ```
//!
//! The root pointer changes through ordinary logged page writes. The
//! checkpoint marker is written straight to the file by the checkpoint
//! procedure and is never part of a buffered page flush.

use bytes::{Buf, BufMut};

use strata_common::constants::{STORE_FORMAT_VERSION, STORE_MAGIC};
use strata_common::types::{Lsn, PageId, TxnId};

use super::checksum::compute_checksum;
use super::types::PageType;
use crate::store::{StorageError, StorageResult};

/// Offset of the root page pointer.
pub const ROOT_OFFSET: usize = 19;

/// End of the static header that the header checksum covers.
const HEADER_CRC_OFFSET: usize = 15;

/// End of the region written by buffered page flushes.
pub const META_HEADER_END: usize = ROOT_OFFSET + 8;

/// Offset of the checkpoint marker.
pub const CHECKPOINT_OFFSET: usize = 64;

/// Encoded size of the checkpoint marker.
pub const CHECKPOINT_LEN: usize = 20;

/// Decoded static metadata of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaPage {
    /// Bytes per page.
    pub page_size: usize,
    /// Tree order the store was created with.
    pub tree_order: usize,
    /// Root of the B+tree, or `PageId::INVALID` for an empty tree.
    pub root: PageId,
}

impl MetaPage {
    /// Creates metadata for a new, empty store.
    pub fn new(page_size: usize, tree_order: usize) -> Self {
        Self {
            page_size,
            tree_order,
            root: PageId::INVALID,
        }
    }

    /// Encodes a full page. The checkpoint marker region is left zeroed.
    pub fn encode(&self) -> Vec<u8> {
        let mut page = Vec::with_capacity(self.page_size);
        page.put_u8(PageType::Meta.as_u8());
        page.put_u32_le(STORE_MAGIC);
        page.put_u16_le(STORE_FORMAT_VERSION);
        page.put_u32_le(self.page_size as u32);
        page.put_u32_le(self.tree_order as u32);
        let crc = compute_checksum(&page[..HEADER_CRC_OFFSET]);
        page.put_u32_le(crc);
        page.put_u64_le(self.root.as_u64());
        page.resize(self.page_size, 0);
        page
    }

    /// Decodes and validates the static header plus root pointer.
    ///
    /// Only the first [`META_HEADER_END`] bytes are needed, so this also
    /// works on a prefix read before the page size is known.
    pub fn decode(data: &[u8]) -> StorageResult<Self> {
        if data.len() < META_HEADER_END {
            return Err(StorageError::invalid_meta("metadata page truncated"));
        }

        let mut buf = data;
        let tag = buf.get_u8();
        if tag != PageType::Meta.as_u8() {
            return Err(StorageError::invalid_meta(format!(
                "page 0 has tag {tag}, expected metadata"
            )));
        }

        let magic = buf.get_u32_le();
        if magic != STORE_MAGIC {
            return Err(StorageError::invalid_meta(format!(
                "bad magic {magic:#010x}"
            )));
        }

        let version = buf.get_u16_le();
        if version != STORE_FORMAT_VERSION {
            return Err(StorageError::invalid_meta(format!(
                "unsupported format version {version}"
            )));
        }

        let page_size = buf.get_u32_le() as usize;
        let tree_order = buf.get_u32_le() as usize;
        let stored = buf.get_u32_le();
        let computed = compute_checksum(&data[..HEADER_CRC_OFFSET]);
        if stored != computed {
            return Err(StorageError::invalid_meta(format!(
                "header checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"
            )));
        }

        let root = PageId::new(buf.get_u64_le());

        Ok(Self {
            page_size,
            tree_order,
            root,
        })
    }

    /// Reads just the root pointer from a metadata page.
    pub fn read_root(data: &[u8]) -> StorageResult<PageId> {
        let bytes = data
            .get(ROOT_OFFSET..META_HEADER_END)
            .ok_or_else(|| StorageError::invalid_meta("metadata page truncated"))?;
        let mut buf = bytes;
        Ok(PageId::new(buf.get_u64_le()))
    }

    /// Encodes a root pointer for writing at [`ROOT_OFFSET`].
    pub fn encode_root(root: PageId) -> [u8; 8] {
        root.as_u64().to_le_bytes()
    }
}

/// The durable recovery floor.
///
/// Everything logged below `floor` is reflected in the page file. Recovery
/// starts reading the log here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointMarker {
    /// First LSN recovery must read.
    pub floor: Lsn,
    /// Lowest transaction ID not yet handed out.
    pub next_txn_id: TxnId,
}

impl CheckpointMarker {
    /// Marker of a freshly created store.
    pub const INITIAL: Self = Self {
        floor: Lsn::ZERO,
        next_txn_id: TxnId::MIN,
    };

    /// Encodes the marker with its checksum.
    pub fn encode(&self) -> [u8; CHECKPOINT_LEN] {
        let mut out = [0u8; CHECKPOINT_LEN];
        let mut buf = &mut out[..];
        buf.put_u64_le(self.floor.as_u64());
        buf.put_u64_le(self.next_txn_id.as_u64());
        let crc = compute_checksum(&out[..16]);
        out[16..].copy_from_slice(&crc.to_le_bytes());
        out
    }

    /// Decodes a marker, failing if its checksum does not match.
    pub fn decode(data: &[u8]) -> StorageResult<Self> {
        if data.len() < CHECKPOINT_LEN {
            return Err(StorageError::invalid_meta("checkpoint marker truncated"));
        }

        let mut buf = data;
        let floor = Lsn::from_raw(buf.get_u64_le());
        let next_txn_id = TxnId::new(buf.get_u64_le());
        let stored = buf.get_u32_le();
        let computed = compute_checksum(&data[..16]);
        if stored != computed {
            return Err(StorageError::CheckpointChecksum { stored, computed });
        }

        Ok(Self { floor, next_txn_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_roundtrip() {
        let mut meta = MetaPage::new(512, 4);
        meta.root = PageId::new(7);
        let page = meta.encode();
        assert_eq!(page.len(), 512);
        assert_eq!(MetaPage::decode(&page).unwrap(), meta);
        assert_eq!(MetaPage::read_root(&page).unwrap(), PageId::new(7));
    }

    #[test]
    fn test_root_is_outside_header_checksum() {
        let page = MetaPage::new(512, 4).encode();
        let mut patched = page.clone();
        patched[ROOT_OFFSET..META_HEADER_END].copy_from_slice(&MetaPage::encode_root(PageId::new(3)));

        let meta = MetaPage::decode(&patched).unwrap();
        assert_eq!(meta.root, PageId::new(3));
    }

    #[test]
    fn test_meta_rejects_corruption() {
        let mut page = MetaPage::new(512, 4).encode();
        page[8] ^= 0xFF;
        assert!(matches!(
            MetaPage::decode(&page),
            Err(StorageError::InvalidMeta { .. })
        ));

        let mut page = MetaPage::new(512, 4).encode();
        page[0] = PageType::Leaf.as_u8();
        assert!(MetaPage::decode(&page).is_err());
    }

    #[test]
    fn test_checkpoint_marker() {
        let marker = CheckpointMarker {
            floor: Lsn::new(2, 128),
            next_txn_id: TxnId::new(40),
        };
        let mut bytes = marker.encode();
        assert_eq!(CheckpointMarker::decode(&bytes).unwrap(), marker);

        bytes[3] ^= 0x10;
        assert!(matches!(
            CheckpointMarker::decode(&bytes),
            Err(StorageError::CheckpointChecksum { .. })
        ));
    }

    #[test]
    fn test_marker_region_does_not_overlap_header() {
        assert!(META_HEADER_END <= CHECKPOINT_OFFSET);
        assert!(CHECKPOINT_OFFSET + CHECKPOINT_LEN <= strata_common::constants::MIN_PAGE_SIZE);
    }
}
