//! B+Tree node definitions and page encoding.
//!
//! Both node kinds start with the page type tag. Integers are little-endian.
//!
//! ```text
//! Leaf:      [tag][count: u16][next leaf: u64] { [klen: u16][key][vlen: u16][value] }*
//! Internal:  [tag][count: u16][child 0: u64]   { [klen: u16][key][child: u64] }*
//! ```
//!
//! For an internal node `count` is the number of keys; it always has one
//! more child than keys. Child `i + 1` holds keys `>= keys[i]`.

use bytes::{Buf, BufMut, Bytes};

use strata_common::constants::{INTERNAL_ENTRY_OVERHEAD, LEAF_ENTRY_OVERHEAD, NODE_HEADER_SIZE};
use strata_common::types::PageId;

use super::error::{TreeError, TreeResult};
use crate::page::PageType;

/// A key-value pair stored in a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafEntry {
    /// The key.
    pub key: Bytes,
    /// The value.
    pub value: Bytes,
}

impl LeafEntry {
    /// Creates a new leaf entry.
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Returns the encoded size of this entry.
    pub fn encoded_size(&self) -> usize {
        LEAF_ENTRY_OVERHEAD + self.key.len() + self.value.len()
    }
}

/// A leaf node: sorted entries plus a link to the right sibling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    /// Sorted list of entries.
    pub entries: Vec<LeafEntry>,
    /// Right sibling, or `PageId::INVALID` for the last leaf.
    pub next: PageId,
}

impl LeafNode {
    /// Creates a new empty leaf node.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next: PageId::INVALID,
        }
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the node is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finds the position for a key using binary search.
    pub fn search(&self, key: &[u8]) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| e.key.as_ref().cmp(key))
    }

    /// Gets the value for a key.
    pub fn get(&self, key: &[u8]) -> Option<&Bytes> {
        self.search(key).ok().map(|idx| &self.entries[idx].value)
    }

    /// Returns the first key.
    pub fn first_key(&self) -> Option<&Bytes> {
        self.entries.first().map(|e| &e.key)
    }

    /// Moves the upper half of the entries into a new right sibling.
    ///
    /// The caller links the sibling into the chain.
    pub fn split(&mut self) -> LeafNode {
        let mid = self.entries.len() / 2;
        LeafNode {
            entries: self.entries.split_off(mid),
            next: PageId::INVALID,
        }
    }

    /// Appends the entries of the right sibling and takes over its link.
    pub fn merge(&mut self, right: LeafNode) {
        self.entries.extend(right.entries);
        self.next = right.next;
    }

    /// Returns the encoded size of this node.
    pub fn encoded_size(&self) -> usize {
        NODE_HEADER_SIZE + self.entries.iter().map(LeafEntry::encoded_size).sum::<usize>()
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.put_u8(PageType::Leaf.as_u8());
        buf.put_u16_le(self.entries.len() as u16);
        buf.put_u64_le(self.next.as_u64());
        for entry in &self.entries {
            buf.put_u16_le(entry.key.len() as u16);
            buf.put_slice(&entry.key);
            buf.put_u16_le(entry.value.len() as u16);
            buf.put_slice(&entry.value);
        }
    }

    fn decode_body(page_id: PageId, mut buf: &[u8]) -> TreeResult<Self> {
        let count = buf.get_u16_le() as usize;
        let next = PageId::new(buf.get_u64_le());

        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let key = take_prefixed(page_id, &mut buf, "leaf key", i)?;
            let value = take_prefixed(page_id, &mut buf, "leaf value", i)?;
            if let Some(prev) = entries.last().map(|e: &LeafEntry| &e.key) {
                if prev >= &key {
                    return Err(TreeError::corrupt(
                        page_id,
                        format!("leaf keys out of order at entry {i}"),
                    ));
                }
            }
            entries.push(LeafEntry { key, value });
        }

        Ok(Self { entries, next })
    }
}

impl Default for LeafNode {
    fn default() -> Self {
        Self::new()
    }
}

/// An internal node: separator keys and child pointers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNode {
    /// Sorted separator keys.
    pub keys: Vec<Bytes>,
    /// Child pages, always one more than keys.
    pub children: Vec<PageId>,
}

impl InternalNode {
    /// Creates a root with two children split around `separator`.
    pub fn new_root(left: PageId, separator: Bytes, right: PageId) -> Self {
        Self {
            keys: vec![separator],
            children: vec![left, right],
        }
    }

    /// Returns the index of the child whose subtree covers `key`.
    ///
    /// Keys equal to a separator go right.
    pub fn child_index(&self, key: &[u8]) -> usize {
        self.keys.partition_point(|k| k.as_ref() <= key)
    }

    /// Returns the child whose subtree covers `key`.
    pub fn child_for(&self, key: &[u8]) -> PageId {
        self.children[self.child_index(key)]
    }

    /// Inserts a separator and the child to its right after child `idx`.
    pub fn insert_child(&mut self, idx: usize, separator: Bytes, child: PageId) {
        self.keys.insert(idx, separator);
        self.children.insert(idx + 1, child);
    }

    /// Splits off the upper half, returning the promoted key and the new
    /// right sibling.
    pub fn split(&mut self) -> (Bytes, InternalNode) {
        let mid = self.keys.len() / 2;
        let right_keys = self.keys.split_off(mid + 1);
        let promoted = self.keys.pop().unwrap_or_default();
        let right_children = self.children.split_off(mid + 1);
        (
            promoted,
            InternalNode {
                keys: right_keys,
                children: right_children,
            },
        )
    }

    /// Appends the right sibling, pulling the parent separator down between.
    pub fn merge(&mut self, separator: Bytes, right: InternalNode) {
        self.keys.push(separator);
        self.keys.extend(right.keys);
        self.children.extend(right.children);
    }

    /// Returns the encoded size of this node.
    pub fn encoded_size(&self) -> usize {
        NODE_HEADER_SIZE
            + self
                .keys
                .iter()
                .map(|k| INTERNAL_ENTRY_OVERHEAD + k.len())
                .sum::<usize>()
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.put_u8(PageType::Internal.as_u8());
        buf.put_u16_le(self.keys.len() as u16);
        buf.put_u64_le(self.children[0].as_u64());
        for (key, child) in self.keys.iter().zip(&self.children[1..]) {
            buf.put_u16_le(key.len() as u16);
            buf.put_slice(key);
            buf.put_u64_le(child.as_u64());
        }
    }

    fn decode_body(page_id: PageId, mut buf: &[u8]) -> TreeResult<Self> {
        let count = buf.get_u16_le() as usize;
        let first = PageId::new(buf.get_u64_le());
        if !first.is_valid() {
            return Err(TreeError::corrupt(page_id, "internal node has no children"));
        }

        let mut keys: Vec<Bytes> = Vec::with_capacity(count);
        let mut children = Vec::with_capacity(count + 1);
        children.push(first);
        for i in 0..count {
            let key = take_prefixed(page_id, &mut buf, "separator", i)?;
            if buf.remaining() < 8 {
                return Err(TreeError::corrupt(
                    page_id,
                    format!("child pointer {} overruns the page", i + 1),
                ));
            }
            let child = PageId::new(buf.get_u64_le());
            if !child.is_valid() {
                return Err(TreeError::corrupt(
                    page_id,
                    format!("child pointer {} is invalid", i + 1),
                ));
            }
            if keys.last().is_some_and(|prev| prev >= &key) {
                return Err(TreeError::corrupt(
                    page_id,
                    format!("separators out of order at key {i}"),
                ));
            }
            keys.push(key);
            children.push(child);
        }

        Ok(Self { keys, children })
    }
}

/// A decoded tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Leaf node.
    Leaf(LeafNode),
    /// Internal node.
    Internal(InternalNode),
}

impl Node {
    /// Decodes a node from a page.
    pub fn decode(page_id: PageId, data: &[u8]) -> TreeResult<Self> {
        if data.len() < NODE_HEADER_SIZE {
            return Err(TreeError::corrupt(page_id, "page shorter than a node header"));
        }

        match PageType::of(data) {
            Some(PageType::Leaf) => Ok(Node::Leaf(LeafNode::decode_body(page_id, &data[1..])?)),
            Some(PageType::Internal) => Ok(Node::Internal(InternalNode::decode_body(
                page_id,
                &data[1..],
            )?)),
            Some(other) => Err(TreeError::corrupt(
                page_id,
                format!("expected a tree node, found {other} page"),
            )),
            None => Err(TreeError::corrupt(
                page_id,
                format!("unknown page tag {}", data[0]),
            )),
        }
    }

    /// Encodes the node into a full page.
    pub fn encode(&self, page_id: PageId, page_size: usize) -> TreeResult<Vec<u8>> {
        let size = self.encoded_size();
        if size > page_size {
            return Err(TreeError::NodeOverflow {
                page_id,
                size,
                page_size,
            });
        }

        let mut buf = Vec::with_capacity(page_size);
        match self {
            Node::Leaf(leaf) => leaf.encode_into(&mut buf),
            Node::Internal(internal) => internal.encode_into(&mut buf),
        }
        buf.resize(page_size, 0);
        Ok(buf)
    }

    /// Returns the encoded size of this node.
    pub fn encoded_size(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.encoded_size(),
            Node::Internal(internal) => internal.encoded_size(),
        }
    }

    /// Returns true for leaves.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }
}

/// Reads a u16 length followed by that many bytes.
fn take_prefixed(page_id: PageId, buf: &mut &[u8], what: &str, index: usize) -> TreeResult<Bytes> {
    if buf.remaining() < 2 {
        return Err(TreeError::corrupt(
            page_id,
            format!("{what} {index} length overruns the page"),
        ));
    }
    let len = buf.get_u16_le() as usize;
    if buf.remaining() < len {
        return Err(TreeError::corrupt(
            page_id,
            format!("{what} {index} of {len} bytes overruns the page"),
        ));
    }
    let bytes = Bytes::copy_from_slice(&buf[..len]);
    buf.advance(len);
    Ok(bytes)
}
