//! B+Tree operations over a page provider.
//!
//! The tree itself is stateless apart from its configuration: the root lives
//! in the page source and every node is read and written as a whole page.
//! Callers serialize mutations; the tree takes no latches of its own.

use bytes::Bytes;

use strata_common::types::PageId;

use super::config::TreeConfig;
use super::cursor::KeyRange;
use super::error::TreeError;
use super::node::{InternalNode, LeafEntry, LeafNode, Node};
use super::provider::{PageProvider, PageReader};

/// Statistics gathered by [`BTree::verify`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Levels from root to leaves; 0 for an empty tree.
    pub height: usize,
    /// Number of leaf nodes.
    pub leaf_count: usize,
    /// Number of internal nodes.
    pub internal_count: usize,
    /// Number of key-value entries.
    pub key_count: usize,
}

/// One step of a root-to-leaf descent.
struct PathFrame {
    page_id: PageId,
    node: InternalNode,
    child_idx: usize,
}

/// A B+Tree index.
#[derive(Debug, Clone)]
pub struct BTree {
    config: TreeConfig,
}

impl BTree {
    /// Creates a tree handle with the given configuration.
    pub fn new(config: TreeConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    // =========================================================================
    // Core Operations
    // =========================================================================

    /// Looks up the value stored under `key`.
    pub fn search<R: PageReader>(&self, pages: &R, key: &[u8]) -> Result<Bytes, R::Error> {
        let root = pages.root()?;
        if !root.is_valid() {
            return Err(TreeError::KeyNotFound.into());
        }

        let (_, leaf) = self.find_leaf(pages, root, Some(key))?;
        leaf.get(key)
            .cloned()
            .ok_or_else(|| TreeError::KeyNotFound.into())
    }

    /// Inserts a key-value pair.
    ///
    /// Fails with `DuplicateKey` if the key exists, unless overwrites are
    /// enabled, in which case the previous value is returned.
    pub fn insert<P: PageProvider>(
        &self,
        pages: &mut P,
        key: &[u8],
        value: &[u8],
    ) -> Result<Option<Bytes>, P::Error> {
        self.config.check_entry(key, value)?;
        let entry = LeafEntry::new(Bytes::copy_from_slice(key), Bytes::copy_from_slice(value));

        let root = pages.root()?;
        if !root.is_valid() {
            let page_id = pages.allocate_page()?;
            let mut leaf = LeafNode::new();
            leaf.entries.push(entry);
            self.write_node(pages, page_id, &Node::Leaf(leaf))?;
            pages.set_root(page_id)?;
            return Ok(None);
        }

        let mut path = Vec::new();
        let (leaf_id, mut leaf) = self.descend(pages, root, key, &mut path)?;

        match leaf.search(key) {
            Ok(idx) => {
                if !self.config.allow_overwrite() {
                    return Err(TreeError::DuplicateKey.into());
                }
                let old = std::mem::replace(&mut leaf.entries[idx].value, entry.value);
                self.write_node(pages, leaf_id, &Node::Leaf(leaf))?;
                return Ok(Some(old));
            }
            Err(idx) => leaf.entries.insert(idx, entry),
        }

        if leaf.len() <= self.config.leaf_max_entries() {
            self.write_node(pages, leaf_id, &Node::Leaf(leaf))?;
            return Ok(None);
        }

        let right_id = pages.allocate_page()?;
        let mut right = leaf.split();
        right.next = leaf.next;
        leaf.next = right_id;
        let separator = right.first_key().cloned().unwrap_or_default();
        self.write_node(pages, leaf_id, &Node::Leaf(leaf))?;
        self.write_node(pages, right_id, &Node::Leaf(right))?;

        self.insert_into_parent(pages, path, leaf_id, separator, right_id)?;
        Ok(None)
    }

    /// Removes `key`, returning its value.
    pub fn delete<P: PageProvider>(&self, pages: &mut P, key: &[u8]) -> Result<Bytes, P::Error> {
        let root = pages.root()?;
        if !root.is_valid() {
            return Err(TreeError::KeyNotFound.into());
        }

        let mut path = Vec::new();
        let (leaf_id, mut leaf) = self.descend(pages, root, key, &mut path)?;
        let idx = leaf.search(key).map_err(|_| TreeError::KeyNotFound)?;
        let removed = leaf.entries.remove(idx);

        if path.is_empty() || leaf.len() >= self.config.leaf_min_entries() {
            self.write_node(pages, leaf_id, &Node::Leaf(leaf))?;
        } else {
            self.rebalance(pages, path, leaf_id, Node::Leaf(leaf))?;
        }

        Ok(removed.value)
    }

    // =========================================================================
    // Range Operations
    // =========================================================================

    /// Returns every entry in `range`, in key order.
    pub fn scan<R: PageReader>(
        &self,
        pages: &R,
        range: &KeyRange,
    ) -> Result<Vec<(Bytes, Bytes)>, R::Error> {
        let root = pages.root()?;
        if !root.is_valid() {
            return Ok(Vec::new());
        }

        let (_, mut leaf) = self.find_leaf(pages, root, range.seek_key())?;
        let mut results = Vec::new();
        loop {
            for entry in &leaf.entries {
                if range.is_after_end(&entry.key) {
                    return Ok(results);
                }
                if !range.is_before_start(&entry.key) {
                    results.push((entry.key.clone(), entry.value.clone()));
                }
            }

            if !leaf.next.is_valid() {
                return Ok(results);
            }
            leaf = match self.read_node(pages, leaf.next)? {
                Node::Leaf(next) => next,
                Node::Internal(_) => {
                    return Err(TreeError::corrupt(leaf.next, "sibling link points at an internal node").into())
                }
            };
        }
    }

    /// Returns the number of levels, 0 for an empty tree.
    pub fn height<R: PageReader>(&self, pages: &R) -> Result<usize, R::Error> {
        let mut page_id = pages.root()?;
        if !page_id.is_valid() {
            return Ok(0);
        }

        let mut height = 1;
        while let Node::Internal(node) = self.read_node(pages, page_id)? {
            page_id = node.children[0];
            height += 1;
        }
        Ok(height)
    }

    /// Walks the whole tree and checks its structural invariants.
    ///
    /// Checked: key order within nodes and against parent separators, fill
    /// bounds for non-root nodes, equal leaf depth, and that the sibling
    /// chain visits the leaves in order.
    pub fn verify<R: PageReader>(&self, pages: &R) -> Result<TreeStats, R::Error> {
        let root = pages.root()?;
        let mut stats = TreeStats::default();
        if !root.is_valid() {
            return Ok(stats);
        }

        let mut leaves = Vec::new();
        let mut leaf_depth = None;
        self.verify_node(
            pages,
            root,
            1,
            None,
            None,
            &mut leaf_depth,
            &mut leaves,
            &mut stats,
        )?;
        stats.height = leaf_depth.unwrap_or(0);

        for window in leaves.windows(2) {
            let (page_id, next) = window[0];
            if next != window[1].0 {
                return Err(TreeError::invariant(format!(
                    "leaf {page_id} links to {next}, expected {}",
                    window[1].0
                ))
                .into());
            }
        }
        if let Some(&(page_id, next)) = leaves.last() {
            if next.is_valid() {
                return Err(TreeError::invariant(format!(
                    "last leaf {page_id} links to {next}"
                ))
                .into());
            }
        }

        Ok(stats)
    }

    // =========================================================================
    // Internal Tree Operations
    // =========================================================================

    fn read_node<R: PageReader>(&self, pages: &R, page_id: PageId) -> Result<Node, R::Error> {
        let data = pages.read_page(page_id)?;
        Ok(Node::decode(page_id, &data)?)
    }

    fn write_node<P: PageProvider>(
        &self,
        pages: &mut P,
        page_id: PageId,
        node: &Node,
    ) -> Result<(), P::Error> {
        let data = node.encode(page_id, self.config.page_size())?;
        pages.write_page(page_id, data)
    }

    /// Finds the leaf covering `key`, or the leftmost leaf for `None`.
    fn find_leaf<R: PageReader>(
        &self,
        pages: &R,
        root: PageId,
        key: Option<&[u8]>,
    ) -> Result<(PageId, LeafNode), R::Error> {
        let mut page_id = root;
        loop {
            match self.read_node(pages, page_id)? {
                Node::Internal(node) => {
                    page_id = match key {
                        Some(key) => node.child_for(key),
                        None => node.children[0],
                    };
                }
                Node::Leaf(leaf) => return Ok((page_id, leaf)),
            }
        }
    }

    /// Finds the leaf covering `key`, recording the internal nodes passed.
    fn descend<R: PageReader>(
        &self,
        pages: &R,
        root: PageId,
        key: &[u8],
        path: &mut Vec<PathFrame>,
    ) -> Result<(PageId, LeafNode), R::Error> {
        let mut page_id = root;
        loop {
            match self.read_node(pages, page_id)? {
                Node::Internal(node) => {
                    let child_idx = node.child_index(key);
                    let child = node.children[child_idx];
                    path.push(PathFrame {
                        page_id,
                        node,
                        child_idx,
                    });
                    page_id = child;
                }
                Node::Leaf(leaf) => return Ok((page_id, leaf)),
            }
        }
    }

    /// Pushes a split upward until a parent has room or the root splits.
    fn insert_into_parent<P: PageProvider>(
        &self,
        pages: &mut P,
        mut path: Vec<PathFrame>,
        mut left_id: PageId,
        mut separator: Bytes,
        mut right_id: PageId,
    ) -> Result<(), P::Error> {
        loop {
            let Some(PathFrame {
                page_id,
                mut node,
                child_idx,
            }) = path.pop()
            else {
                let root_id = pages.allocate_page()?;
                let root = InternalNode::new_root(left_id, separator, right_id);
                self.write_node(pages, root_id, &Node::Internal(root))?;
                return pages.set_root(root_id);
            };

            node.insert_child(child_idx, separator, right_id);
            if node.children.len() <= self.config.internal_max_children() {
                return self.write_node(pages, page_id, &Node::Internal(node));
            }

            let new_id = pages.allocate_page()?;
            let (promoted, right) = node.split();
            self.write_node(pages, page_id, &Node::Internal(node))?;
            self.write_node(pages, new_id, &Node::Internal(right))?;

            left_id = page_id;
            separator = promoted;
            right_id = new_id;
        }
    }

    /// Restores fill bounds after a delete left `node` underfull.
    ///
    /// Borrows from the left sibling, then the right; merges when neither
    /// can spare an entry, and repeats one level up.
    fn rebalance<P: PageProvider>(
        &self,
        pages: &mut P,
        mut path: Vec<PathFrame>,
        mut node_id: PageId,
        mut node: Node,
    ) -> Result<(), P::Error> {
        loop {
            let Some(PathFrame {
                page_id: parent_id,
                node: mut parent,
                child_idx: idx,
            }) = path.pop()
            else {
                return self.finish_root(pages, node_id, node);
            };

            if !self.is_underfull(&node) {
                return self.write_node(pages, node_id, &node);
            }

            let left = if idx > 0 {
                let left_id = parent.children[idx - 1];
                let left = self.read_node(pages, left_id)?;
                if self.can_lend(&left) {
                    let (left, node) = self.borrow_from_left(left, node, &mut parent, idx)?;
                    self.write_node(pages, left_id, &left)?;
                    self.write_node(pages, node_id, &node)?;
                    return self.write_node(pages, parent_id, &Node::Internal(parent));
                }
                Some((left_id, left))
            } else {
                None
            };

            if idx + 1 < parent.children.len() {
                let right_id = parent.children[idx + 1];
                let right = self.read_node(pages, right_id)?;
                if self.can_lend(&right) {
                    let (node, right) = self.borrow_from_right(node, right, &mut parent, idx)?;
                    self.write_node(pages, node_id, &node)?;
                    self.write_node(pages, right_id, &right)?;
                    return self.write_node(pages, parent_id, &Node::Internal(parent));
                }
                if left.is_none() {
                    let separator = parent.keys.remove(idx);
                    parent.children.remove(idx + 1);
                    let merged = merge_nodes(node, separator, right, right_id)?;
                    self.write_node(pages, node_id, &merged)?;
                    pages.free_page(right_id)?;
                    node_id = parent_id;
                    node = Node::Internal(parent);
                    continue;
                }
            }

            let Some((left_id, left)) = left else {
                return Err(TreeError::invariant(format!(
                    "node {node_id} has no siblings under {parent_id}"
                ))
                .into());
            };
            let separator = parent.keys.remove(idx - 1);
            parent.children.remove(idx);
            let merged = merge_nodes(left, separator, node, node_id)?;
            self.write_node(pages, left_id, &merged)?;
            pages.free_page(node_id)?;
            node_id = parent_id;
            node = Node::Internal(parent);
        }
    }

    /// Writes the root after a rebalance, collapsing it if it has one child.
    fn finish_root<P: PageProvider>(
        &self,
        pages: &mut P,
        root_id: PageId,
        root: Node,
    ) -> Result<(), P::Error> {
        match root {
            Node::Internal(node) if node.keys.is_empty() => {
                pages.set_root(node.children[0])?;
                pages.free_page(root_id)
            }
            root => self.write_node(pages, root_id, &root),
        }
    }

    fn is_underfull(&self, node: &Node) -> bool {
        match node {
            Node::Leaf(leaf) => leaf.len() < self.config.leaf_min_entries(),
            Node::Internal(node) => node.children.len() < self.config.internal_min_children(),
        }
    }

    fn can_lend(&self, node: &Node) -> bool {
        match node {
            Node::Leaf(leaf) => leaf.len() > self.config.leaf_min_entries(),
            Node::Internal(node) => node.children.len() > self.config.internal_min_children(),
        }
    }

    fn borrow_from_left(
        &self,
        left: Node,
        node: Node,
        parent: &mut InternalNode,
        idx: usize,
    ) -> Result<(Node, Node), TreeError> {
        match (left, node) {
            (Node::Leaf(mut left), Node::Leaf(mut node)) => {
                let entry = left
                    .entries
                    .pop()
                    .ok_or_else(|| TreeError::invariant("borrowed from an empty leaf"))?;
                parent.keys[idx - 1] = entry.key.clone();
                node.entries.insert(0, entry);
                Ok((Node::Leaf(left), Node::Leaf(node)))
            }
            (Node::Internal(mut left), Node::Internal(mut node)) => {
                let (key, child) = left
                    .keys
                    .pop()
                    .zip(left.children.pop())
                    .ok_or_else(|| TreeError::invariant("borrowed from an empty internal node"))?;
                let separator = std::mem::replace(&mut parent.keys[idx - 1], key);
                node.keys.insert(0, separator);
                node.children.insert(0, child);
                Ok((Node::Internal(left), Node::Internal(node)))
            }
            _ => Err(TreeError::invariant("siblings at different depths")),
        }
    }

    fn borrow_from_right(
        &self,
        node: Node,
        right: Node,
        parent: &mut InternalNode,
        idx: usize,
    ) -> Result<(Node, Node), TreeError> {
        match (node, right) {
            (Node::Leaf(mut node), Node::Leaf(mut right)) => {
                if right.entries.len() < 2 {
                    return Err(TreeError::invariant("borrowed from a minimal leaf"));
                }
                let entry = right.entries.remove(0);
                node.entries.push(entry);
                parent.keys[idx] = right.entries[0].key.clone();
                Ok((Node::Leaf(node), Node::Leaf(right)))
            }
            (Node::Internal(mut node), Node::Internal(mut right)) => {
                if right.keys.is_empty() {
                    return Err(TreeError::invariant("borrowed from a minimal internal node"));
                }
                let key = right.keys.remove(0);
                let child = right.children.remove(0);
                let separator = std::mem::replace(&mut parent.keys[idx], key);
                node.keys.push(separator);
                node.children.push(child);
                Ok((Node::Internal(node), Node::Internal(right)))
            }
            _ => Err(TreeError::invariant("siblings at different depths")),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn verify_node<R: PageReader>(
        &self,
        pages: &R,
        page_id: PageId,
        depth: usize,
        lower: Option<&Bytes>,
        upper: Option<&Bytes>,
        leaf_depth: &mut Option<usize>,
        leaves: &mut Vec<(PageId, PageId)>,
        stats: &mut TreeStats,
    ) -> Result<(), R::Error> {
        let is_root = depth == 1;
        let out_of_bounds = |key: &Bytes| {
            lower.is_some_and(|lo| key < lo) || upper.is_some_and(|hi| key >= hi)
        };

        match self.read_node(pages, page_id)? {
            Node::Leaf(leaf) => {
                if !is_root && leaf.len() < self.config.leaf_min_entries() {
                    return Err(TreeError::invariant(format!(
                        "leaf {page_id} has {} entries, minimum is {}",
                        leaf.len(),
                        self.config.leaf_min_entries()
                    ))
                    .into());
                }
                if leaf.len() > self.config.leaf_max_entries() {
                    return Err(TreeError::invariant(format!(
                        "leaf {page_id} has {} entries, maximum is {}",
                        leaf.len(),
                        self.config.leaf_max_entries()
                    ))
                    .into());
                }
                if leaf.entries.iter().any(|e| out_of_bounds(&e.key)) {
                    return Err(TreeError::invariant(format!(
                        "leaf {page_id} holds a key outside its parent's range"
                    ))
                    .into());
                }
                match *leaf_depth {
                    Some(expected) if expected != depth => {
                        return Err(TreeError::invariant(format!(
                            "leaf {page_id} at depth {depth}, other leaves at {expected}"
                        ))
                        .into());
                    }
                    Some(_) => {}
                    None => *leaf_depth = Some(depth),
                }

                stats.leaf_count += 1;
                stats.key_count += leaf.len();
                leaves.push((page_id, leaf.next));
            }
            Node::Internal(node) => {
                let min = if is_root {
                    2
                } else {
                    self.config.internal_min_children()
                };
                if node.children.len() < min
                    || node.children.len() > self.config.internal_max_children()
                {
                    return Err(TreeError::invariant(format!(
                        "internal node {page_id} has {} children",
                        node.children.len()
                    ))
                    .into());
                }
                if node.keys.iter().any(out_of_bounds) {
                    return Err(TreeError::invariant(format!(
                        "internal node {page_id} holds a separator outside its parent's range"
                    ))
                    .into());
                }

                stats.internal_count += 1;
                for (i, &child) in node.children.iter().enumerate() {
                    let lo = if i == 0 { lower } else { Some(&node.keys[i - 1]) };
                    let hi = node.keys.get(i).or(upper);
                    self.verify_node(pages, child, depth + 1, lo, hi, leaf_depth, leaves, stats)?;
                }
            }
        }
        Ok(())
    }
}

/// Merges `right` into `left`, pulling `separator` down for internal nodes.
fn merge_nodes(
    left: Node,
    separator: Bytes,
    right: Node,
    right_id: PageId,
) -> Result<Node, TreeError> {
    match (left, right) {
        (Node::Leaf(mut left), Node::Leaf(right)) => {
            left.merge(right);
            Ok(Node::Leaf(left))
        }
        (Node::Internal(mut left), Node::Internal(right)) => {
            left.merge(separator, right);
            Ok(Node::Internal(left))
        }
        _ => Err(TreeError::invariant(format!(
            "cannot merge {right_id} into a node of another kind"
        ))),
    }
}
