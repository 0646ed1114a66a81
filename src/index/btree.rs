use std::rc::Rc;

use tracing::debug;

use crate::storage::{BufferPoolManager, PageGuard, PageId, Rid, INVALID_PAGE_ID};

use super::error::{IndexError, IndexResult};
use super::node::{self, InternalNode, LeafNode, NodeType, MAX_FANOUT};

/// Ordered map from `i32` key to `Rid`, stored entirely in buffer-pool
/// pages. `max_size` is the node fanout, fixed at construction and stamped
/// into every node header.
///
/// Every operation is a dance of fetch/mutate/unpin; pins are held by
/// `PageGuard`s so each exit path releases exactly once. A walk holds one
/// pin at a time; a split holds at most three.
pub struct BPlusTree {
    bpm: Rc<BufferPoolManager>,
    root_page_id: PageId,
    max_size: u32,
}

impl BPlusTree {
    /// Create an empty tree: the root starts as an empty leaf.
    pub fn new(bpm: Rc<BufferPoolManager>, max_size: u32) -> IndexResult<Self> {
        if !(3..=MAX_FANOUT).contains(&max_size) {
            return Err(IndexError::InvalidFanout(max_size, MAX_FANOUT));
        }
        let guard = bpm.new_page()?;
        let root_page_id = guard.page_id();
        LeafNode::init(&mut guard.data_mut()[..], root_page_id, INVALID_PAGE_ID, max_size);
        drop(guard);
        Ok(Self {
            bpm,
            root_page_id,
            max_size,
        })
    }

    /// Reattach a tree whose root page id was persisted externally.
    pub fn open(bpm: Rc<BufferPoolManager>, root_page_id: PageId, max_size: u32) -> Self {
        Self {
            bpm,
            root_page_id,
            max_size,
        }
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    /// Minimum occupancy of a non-root node.
    fn min_size(&self) -> u32 {
        self.max_size.div_ceil(2)
    }

    /// Walk from the root to the leaf that owns `key`, pinning one page at
    /// a time. Returns the pinned leaf.
    fn find_leaf(&self, key: i32) -> IndexResult<PageGuard<'_>> {
        let mut page_id = self.root_page_id;
        loop {
            let guard = self.bpm.fetch_page(page_id)?;
            let child = {
                let data = guard.data();
                match node::node_type(&data)? {
                    NodeType::Leaf => None,
                    NodeType::Internal => {
                        let internal = InternalNode::new(&data[..])?;
                        Some(internal.child_at(internal.child_index_for(key)))
                    }
                }
            };
            match child {
                None => return Ok(guard),
                Some(next) => {
                    drop(guard);
                    page_id = next;
                }
            }
        }
    }

    /// Look up `key`, returning its Rid if present.
    pub fn search(&self, key: i32) -> IndexResult<Option<Rid>> {
        let guard = self.find_leaf(key)?;
        let data = guard.data();
        let leaf = LeafNode::new(&data[..])?;
        let index = leaf.lower_bound(key);
        if index < leaf.size() as usize && leaf.key_at(index) == key {
            Ok(Some(leaf.rid_at(index)))
        } else {
            Ok(None)
        }
    }

    /// Insert `key -> rid`. Returns `Ok(false)` if the key already exists;
    /// duplicates are rejected.
    pub fn insert(&mut self, key: i32, rid: Rid) -> IndexResult<bool> {
        loop {
            let guard = self.find_leaf(key)?;
            let leaf_page_id = guard.page_id();
            let (index, duplicate, full) = {
                let data = guard.data();
                let leaf = LeafNode::new(&data[..])?;
                let index = leaf.lower_bound(key);
                let duplicate = index < leaf.size() as usize && leaf.key_at(index) == key;
                (index, duplicate, leaf.size() >= self.max_size)
            };
            if duplicate {
                return Ok(false);
            }
            if full {
                // The key may belong in either half after the split, so
                // retry the descent from scratch.
                drop(guard);
                self.split(leaf_page_id)?;
                continue;
            }
            let mut data = guard.data_mut();
            let mut leaf = LeafNode::new(&mut data[..])?;
            leaf.insert(index, key, rid);
            return Ok(true);
        }
    }

    /// Delete `key`. Returns `Ok(false)` on a miss.
    pub fn delete(&mut self, key: i32) -> IndexResult<bool> {
        let guard = self.find_leaf(key)?;
        let leaf_page_id = guard.page_id();
        let (index, parent) = {
            let data = guard.data();
            let leaf = LeafNode::new(&data[..])?;
            let index = leaf.lower_bound(key);
            if index >= leaf.size() as usize || leaf.key_at(index) != key {
                return Ok(false);
            }
            (index, leaf.parent_page_id())
        };
        let remaining = {
            let mut data = guard.data_mut();
            let mut leaf = LeafNode::new(&mut data[..])?;
            leaf.remove(index);
            leaf.size()
        };
        drop(guard);

        if parent != INVALID_PAGE_ID && remaining < self.min_size() {
            self.handle_leaf_underflow(leaf_page_id)?;
        }
        Ok(true)
    }

    fn split(&mut self, page_id: PageId) -> IndexResult<()> {
        let bpm = self.bpm.clone();
        let guard = bpm.fetch_page(page_id)?;
        let kind = node::node_type(&guard.data())?;
        match kind {
            NodeType::Leaf => self.split_leaf(guard),
            NodeType::Internal => self.split_internal(guard),
        }
    }

    /// Split a full leaf: the upper half moves to a new right sibling and
    /// a copy of its first key is promoted as the separator.
    fn split_leaf(&mut self, left: PageGuard<'_>) -> IndexResult<()> {
        let left_id = left.page_id();
        let (size, parent, next, separator) = {
            let data = left.data();
            let leaf = LeafNode::new(&data[..])?;
            let size = leaf.size() as usize;
            (
                size,
                leaf.parent_page_id(),
                leaf.next_page_id(),
                leaf.key_at(size / 2),
            )
        };
        let mid = size / 2;

        let right = self.bpm.new_page()?;
        let right_id = right.page_id();
        {
            let l_data = left.data();
            let l = LeafNode::new(&l_data[..])?;
            let mut r_data = right.data_mut();
            let mut r = LeafNode::init(&mut r_data[..], right_id, parent, self.max_size);
            for i in mid..size {
                r.set_key_at(i - mid, l.key_at(i));
                r.set_rid_at(i - mid, l.rid_at(i));
            }
            r.set_size((size - mid) as u32);
            r.set_next_page_id(next);
        }

        // The right half is fully initialized; only now mutate the left
        // page, so a failed allocation above leaves the tree untouched.
        {
            let mut data = left.data_mut();
            let mut l = LeafNode::new(&mut data[..])?;
            l.set_size(mid as u32);
            l.set_next_page_id(right_id);
        }
        drop(left);
        drop(right);
        debug!(left = left_id, right = right_id, separator, "leaf split");

        if parent == INVALID_PAGE_ID {
            self.create_new_root(left_id, right_id, separator)
        } else {
            self.insert_into_parent(left_id, right_id, separator)
        }
    }

    /// Split a full internal node: the key at the midpoint is promoted
    /// (not copied), and children moved to the new node are reparented.
    fn split_internal(&mut self, left: PageGuard<'_>) -> IndexResult<()> {
        let left_id = left.page_id();
        let (size, parent, separator) = {
            let data = left.data();
            let internal = InternalNode::new(&data[..])?;
            let size = internal.size() as usize;
            (size, internal.parent_page_id(), internal.key_at(size / 2))
        };
        let mid = size / 2;
        let moved = size - mid - 1;

        let right = self.bpm.new_page()?;
        let right_id = right.page_id();
        {
            let l_data = left.data();
            let l = InternalNode::new(&l_data[..])?;
            let mut r_data = right.data_mut();
            let mut r = InternalNode::init(&mut r_data[..], right_id, parent, self.max_size);
            for i in mid + 1..size {
                r.set_key_at(i - mid - 1, l.key_at(i));
                r.set_child_at(i - mid - 1, l.child_at(i));
            }
            r.set_child_at(moved, l.child_at(size));
            r.set_size(moved as u32);
        }
        {
            let mut data = left.data_mut();
            InternalNode::new(&mut data[..])?.set_size(mid as u32);
        }
        drop(left);

        // Every child that moved now answers to the new right node.
        for i in 0..=moved {
            let child_id = {
                let data = right.data();
                InternalNode::new(&data[..])?.child_at(i)
            };
            let child = self.bpm.fetch_page(child_id)?;
            node::set_parent_of(&mut child.data_mut()[..], right_id);
        }
        drop(right);
        debug!(left = left_id, right = right_id, separator, "internal split");

        if parent == INVALID_PAGE_ID {
            self.create_new_root(left_id, right_id, separator)
        } else {
            self.insert_into_parent(left_id, right_id, separator)
        }
    }

    fn create_new_root(&mut self, left_id: PageId, right_id: PageId, key: i32) -> IndexResult<()> {
        let root = self.bpm.new_page()?;
        let root_id = root.page_id();
        {
            let mut data = root.data_mut();
            let mut node = InternalNode::init(&mut data[..], root_id, INVALID_PAGE_ID, self.max_size);
            node.set_key_at(0, key);
            node.set_child_at(0, left_id);
            node.set_child_at(1, right_id);
            node.set_size(1);
        }
        drop(root);

        for id in [left_id, right_id] {
            let child = self.bpm.fetch_page(id)?;
            node::set_parent_of(&mut child.data_mut()[..], root_id);
        }

        debug!(old_root = self.root_page_id, new_root = root_id, "new root");
        self.root_page_id = root_id;
        Ok(())
    }

    /// Hang `right_id` off the parent of `left_id` with `key` as the
    /// separator between them, splitting the parent first if it is full.
    fn insert_into_parent(&mut self, left_id: PageId, right_id: PageId, key: i32) -> IndexResult<()> {
        let parent_id = {
            let left = self.bpm.fetch_page(left_id)?;
            let data = left.data();
            node::parent_of(&data)
        };

        let parent = self.bpm.fetch_page(parent_id)?;
        let full = {
            let data = parent.data();
            InternalNode::new(&data[..])?.size() >= self.max_size
        };
        if full {
            drop(parent);
            self.split(parent_id)?;
            // The split may have moved `left` into the new right half; its
            // parent pointer was rewritten either way, so retry through it.
            return self.insert_into_parent(left_id, right_id, key);
        }

        {
            let mut data = parent.data_mut();
            let mut node = InternalNode::new(&mut data[..])?;
            let index = node.lower_bound(key);
            node.insert_entry(index, key, right_id);
        }
        drop(parent);

        // The right sibling was born pointing at the pre-split parent.
        let right = self.bpm.fetch_page(right_id)?;
        node::set_parent_of(&mut right.data_mut()[..], parent_id);
        Ok(())
    }

    fn handle_leaf_underflow(&mut self, leaf_id: PageId) -> IndexResult<()> {
        let parent_id = {
            let leaf = self.bpm.fetch_page(leaf_id)?;
            let data = leaf.data();
            node::parent_of(&data)
        };
        let (left_id, right_id, key_index) = self.pick_merge_pair(parent_id, leaf_id)?;
        self.merge_or_borrow_leaf(left_id, right_id, parent_id, key_index)
    }

    fn handle_internal_underflow(&mut self, node_id: PageId) -> IndexResult<()> {
        let parent_id = {
            let guard = self.bpm.fetch_page(node_id)?;
            let data = guard.data();
            node::parent_of(&data)
        };
        let (left_id, right_id, key_index) = self.pick_merge_pair(parent_id, node_id)?;
        self.merge_or_borrow_internal(left_id, right_id, parent_id, key_index)
    }

    /// Choose the sibling to rebalance with: the left one when it exists,
    /// else the right. Returns `(left, right, separator key index)`.
    fn pick_merge_pair(
        &self,
        parent_id: PageId,
        node_id: PageId,
    ) -> IndexResult<(PageId, PageId, usize)> {
        let parent = self.bpm.fetch_page(parent_id)?;
        let data = parent.data();
        let internal = InternalNode::new(&data[..])?;
        let position = internal
            .position_of_child(node_id)
            .ok_or_else(|| IndexError::Corrupt {
                page_id: parent_id,
                reason: format!("page {node_id} is not a child of its parent"),
            })?;
        if position > 0 {
            Ok((internal.child_at(position - 1), node_id, position - 1))
        } else {
            Ok((node_id, internal.child_at(position + 1), position))
        }
    }

    /// Merge `right` into `left` if the result fits, else move one entry
    /// from the fuller sibling into the other. Either way the parent's
    /// separator at `key_index` is patched afterwards, children first.
    fn merge_or_borrow_leaf(
        &mut self,
        left_id: PageId,
        right_id: PageId,
        parent_id: PageId,
        key_index: usize,
    ) -> IndexResult<()> {
        let left = self.bpm.fetch_page(left_id)?;
        let right = self.bpm.fetch_page(right_id)?;
        let (left_size, right_size) = {
            let l_data = left.data();
            let r_data = right.data();
            (
                LeafNode::new(&l_data[..])?.size() as usize,
                LeafNode::new(&r_data[..])?.size() as usize,
            )
        };

        if left_size + right_size <= self.max_size as usize {
            {
                let r_data = right.data();
                let r = LeafNode::new(&r_data[..])?;
                let mut l_data = left.data_mut();
                let mut l = LeafNode::new(&mut l_data[..])?;
                for i in 0..right_size {
                    l.set_key_at(left_size + i, r.key_at(i));
                    l.set_rid_at(left_size + i, r.rid_at(i));
                }
                l.set_size((left_size + right_size) as u32);
                l.set_next_page_id(r.next_page_id());
            }
            drop(left);
            drop(right);
            self.bpm.delete_page(right_id);
            debug!(left = left_id, right = right_id, "leaf merge");
            return self.delete_from_parent(parent_id, key_index);
        }

        // Merging would overflow the left node, so redistribute one entry
        // from the fuller sibling instead. The donor stays at or above the
        // minimum because the pair together exceed `max_size`.
        let new_separator;
        if left_size > right_size {
            let (key, rid) = {
                let l_data = left.data();
                let l = LeafNode::new(&l_data[..])?;
                (l.key_at(left_size - 1), l.rid_at(left_size - 1))
            };
            {
                let mut l_data = left.data_mut();
                LeafNode::new(&mut l_data[..])?.set_size(left_size as u32 - 1);
            }
            let mut r_data = right.data_mut();
            LeafNode::new(&mut r_data[..])?.insert(0, key, rid);
            new_separator = key;
        } else {
            let (key, rid) = {
                let r_data = right.data();
                let r = LeafNode::new(&r_data[..])?;
                (r.key_at(0), r.rid_at(0))
            };
            {
                let mut r_data = right.data_mut();
                LeafNode::new(&mut r_data[..])?.remove(0);
            }
            {
                let mut l_data = left.data_mut();
                LeafNode::new(&mut l_data[..])?.insert(left_size, key, rid);
            }
            let r_data = right.data();
            new_separator = LeafNode::new(&r_data[..])?.key_at(0);
        }
        drop(left);
        drop(right);
        debug!(left = left_id, right = right_id, new_separator, "leaf borrow");

        let parent = self.bpm.fetch_page(parent_id)?;
        let mut data = parent.data_mut();
        InternalNode::new(&mut data[..])?.set_key_at(key_index, new_separator);
        Ok(())
    }

    fn merge_or_borrow_internal(
        &mut self,
        left_id: PageId,
        right_id: PageId,
        parent_id: PageId,
        key_index: usize,
    ) -> IndexResult<()> {
        let separator = {
            let parent = self.bpm.fetch_page(parent_id)?;
            let data = parent.data();
            InternalNode::new(&data[..])?.key_at(key_index)
        };

        let left = self.bpm.fetch_page(left_id)?;
        let right = self.bpm.fetch_page(right_id)?;
        let (left_size, right_size) = {
            let l_data = left.data();
            let r_data = right.data();
            (
                InternalNode::new(&l_data[..])?.size() as usize,
                InternalNode::new(&r_data[..])?.size() as usize,
            )
        };

        if left_size + right_size + 1 <= self.max_size as usize {
            // Pull the separator down between the two halves, the dual of
            // promotion at split.
            {
                let r_data = right.data();
                let r = InternalNode::new(&r_data[..])?;
                let mut l_data = left.data_mut();
                let mut l = InternalNode::new(&mut l_data[..])?;
                l.set_key_at(left_size, separator);
                for i in 0..right_size {
                    l.set_key_at(left_size + 1 + i, r.key_at(i));
                    l.set_child_at(left_size + 1 + i, r.child_at(i));
                }
                l.set_child_at(left_size + 1 + right_size, r.child_at(right_size));
                l.set_size((left_size + 1 + right_size) as u32);
            }
            for i in 0..=right_size {
                let child_id = {
                    let r_data = right.data();
                    InternalNode::new(&r_data[..])?.child_at(i)
                };
                let child = self.bpm.fetch_page(child_id)?;
                node::set_parent_of(&mut child.data_mut()[..], left_id);
            }
            drop(left);
            drop(right);
            self.bpm.delete_page(right_id);
            debug!(left = left_id, right = right_id, "internal merge");
            return self.delete_from_parent(parent_id, key_index);
        }

        // Rotate one child through the parent instead of merging.
        let new_separator;
        if left_size > right_size {
            let (donated_key, donated_child) = {
                let l_data = left.data();
                let l = InternalNode::new(&l_data[..])?;
                (l.key_at(left_size - 1), l.child_at(left_size))
            };
            {
                let mut r_data = right.data_mut();
                let mut r = InternalNode::new(&mut r_data[..])?;
                for i in (0..right_size).rev() {
                    let k = r.key_at(i);
                    r.set_key_at(i + 1, k);
                }
                for i in (0..=right_size).rev() {
                    let c = r.child_at(i);
                    r.set_child_at(i + 1, c);
                }
                r.set_key_at(0, separator);
                r.set_child_at(0, donated_child);
                r.set_size(right_size as u32 + 1);
            }
            {
                let mut l_data = left.data_mut();
                InternalNode::new(&mut l_data[..])?.set_size(left_size as u32 - 1);
            }
            let child = self.bpm.fetch_page(donated_child)?;
            node::set_parent_of(&mut child.data_mut()[..], right_id);
            new_separator = donated_key;
        } else {
            let (donated_key, donated_child) = {
                let r_data = right.data();
                let r = InternalNode::new(&r_data[..])?;
                (r.key_at(0), r.child_at(0))
            };
            {
                let mut l_data = left.data_mut();
                let mut l = InternalNode::new(&mut l_data[..])?;
                l.set_key_at(left_size, separator);
                l.set_child_at(left_size + 1, donated_child);
                l.set_size(left_size as u32 + 1);
            }
            {
                let mut r_data = right.data_mut();
                let mut r = InternalNode::new(&mut r_data[..])?;
                for i in 0..right_size - 1 {
                    let k = r.key_at(i + 1);
                    r.set_key_at(i, k);
                }
                for i in 0..right_size {
                    let c = r.child_at(i + 1);
                    r.set_child_at(i, c);
                }
                r.set_size(right_size as u32 - 1);
            }
            let child = self.bpm.fetch_page(donated_child)?;
            node::set_parent_of(&mut child.data_mut()[..], left_id);
            new_separator = donated_key;
        }
        drop(left);
        drop(right);
        debug!(left = left_id, right = right_id, new_separator, "internal borrow");

        let parent = self.bpm.fetch_page(parent_id)?;
        let mut data = parent.data_mut();
        InternalNode::new(&mut data[..])?.set_key_at(key_index, new_separator);
        Ok(())
    }

    /// Remove separator `key_index` (and the child to its right) from the
    /// parent, collapsing the root or recursing on underflow.
    fn delete_from_parent(&mut self, parent_id: PageId, key_index: usize) -> IndexResult<()> {
        let parent = self.bpm.fetch_page(parent_id)?;
        let remaining = {
            let mut data = parent.data_mut();
            let mut node = InternalNode::new(&mut data[..])?;
            node.remove_entry(key_index);
            node.size()
        };

        if parent_id == self.root_page_id {
            if remaining == 0 {
                // A single child remains: promote it to root.
                let child_id = {
                    let data = parent.data();
                    InternalNode::new(&data[..])?.child_at(0)
                };
                drop(parent);
                let child = self.bpm.fetch_page(child_id)?;
                node::set_parent_of(&mut child.data_mut()[..], INVALID_PAGE_ID);
                drop(child);
                self.bpm.delete_page(parent_id);
                debug!(old_root = parent_id, new_root = child_id, "root collapse");
                self.root_page_id = child_id;
            }
            return Ok(());
        }
        drop(parent);

        if remaining < self.min_size() {
            return self.handle_internal_underflow(parent_id);
        }
        Ok(())
    }

    /// Iterate all entries in ascending key order along the leaf chain.
    pub fn iter(&self) -> IndexResult<TreeIter<'_>> {
        let mut page_id = self.root_page_id;
        loop {
            let guard = self.bpm.fetch_page(page_id)?;
            let next = {
                let data = guard.data();
                match node::node_type(&data)? {
                    NodeType::Leaf => None,
                    NodeType::Internal => Some(InternalNode::new(&data[..])?.child_at(0)),
                }
            };
            match next {
                None => {
                    return Ok(TreeIter {
                        tree: self,
                        guard: Some(guard),
                        index: 0,
                    })
                }
                Some(child) => {
                    drop(guard);
                    page_id = child;
                }
            }
        }
    }

    /// All entries with `lower <= key <= upper`, in ascending order.
    pub fn range(&self, lower: i32, upper: i32) -> IndexResult<Vec<(i32, Rid)>> {
        let guard = self.find_leaf(lower)?;
        let iter = TreeIter {
            tree: self,
            guard: Some(guard),
            index: 0,
        };
        let mut out = Vec::new();
        for item in iter {
            let (key, rid) = item?;
            if key < lower {
                continue;
            }
            if key > upper {
                break;
            }
            out.push((key, rid));
        }
        Ok(out)
    }
}

/// In-order traversal over the leaf chain, holding one pinned page at a
/// time.
pub struct TreeIter<'a> {
    tree: &'a BPlusTree,
    guard: Option<PageGuard<'a>>,
    index: usize,
}

impl Iterator for TreeIter<'_> {
    type Item = IndexResult<(i32, Rid)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let guard = self.guard.as_ref()?;
            let step = (|| -> IndexResult<Result<(i32, Rid), PageId>> {
                let data = guard.data();
                let leaf = LeafNode::new(&data[..])?;
                if self.index < leaf.size() as usize {
                    Ok(Ok((leaf.key_at(self.index), leaf.rid_at(self.index))))
                } else {
                    Ok(Err(leaf.next_page_id()))
                }
            })();
            match step {
                Err(err) => {
                    self.guard = None;
                    return Some(Err(err));
                }
                Ok(Ok(entry)) => {
                    self.index += 1;
                    return Some(Ok(entry));
                }
                Ok(Err(next_page_id)) => {
                    self.guard = None;
                    if next_page_id == INVALID_PAGE_ID {
                        return None;
                    }
                    match self.tree.bpm.fetch_page(next_page_id) {
                        Ok(next) => {
                            self.guard = Some(next);
                            self.index = 0;
                        }
                        Err(err) => return Some(Err(err.into())),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DiskManager;
    use tempfile::TempDir;

    fn setup(pool_size: usize) -> (TempDir, Rc<BufferPoolManager>) {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskManager::open(dir.path().join("index.db")).unwrap();
        (dir, Rc::new(BufferPoolManager::new(disk, pool_size)))
    }

    fn rid_for(key: i32) -> Rid {
        Rid::new(key, key as u32, 0)
    }

    /// Collect `(key, rid)` pairs via the leaf chain.
    fn collect(tree: &BPlusTree) -> Vec<(i32, Rid)> {
        tree.iter().unwrap().map(|item| item.unwrap()).collect()
    }

    fn assert_sorted_unique(entries: &[(i32, Rid)]) {
        for window in entries.windows(2) {
            assert!(window[0].0 < window[1].0, "keys must be strictly ascending");
        }
    }

    #[test]
    fn test_empty_tree() {
        let (_dir, bpm) = setup(10);
        let tree = BPlusTree::new(Rc::clone(&bpm), 4).unwrap();
        assert_eq!(tree.search(1).unwrap(), None);
        assert!(collect(&tree).is_empty());
    }

    #[test]
    fn test_invalid_fanout_rejected() {
        let (_dir, bpm) = setup(10);
        assert!(BPlusTree::new(Rc::clone(&bpm), 2).is_err());
        assert!(BPlusTree::new(Rc::clone(&bpm), MAX_FANOUT + 1).is_err());
    }

    #[test]
    fn test_insert_and_search_single_leaf() {
        let (_dir, bpm) = setup(10);
        let mut tree = BPlusTree::new(bpm, 5).unwrap();
        for key in [3, 1, 2] {
            assert!(tree.insert(key, rid_for(key)).unwrap());
        }
        for key in [1, 2, 3] {
            assert_eq!(tree.search(key).unwrap(), Some(rid_for(key)));
        }
        assert_eq!(tree.search(4).unwrap(), None);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let (_dir, bpm) = setup(10);
        let mut tree = BPlusTree::new(bpm, 5).unwrap();
        assert!(tree.insert(7, rid_for(7)).unwrap());
        assert!(!tree.insert(7, Rid::new(99, 0, 0)).unwrap());
        // The first mapping survives
        assert_eq!(tree.search(7).unwrap(), Some(rid_for(7)));
    }

    #[test]
    fn test_leaf_split_promotes_first_key_of_right_half() {
        let (_dir, bpm) = setup(20);
        let mut tree = BPlusTree::new(Rc::clone(&bpm), 5).unwrap();
        for key in [10, 20, 30, 40, 50, 60] {
            assert!(tree.insert(key, rid_for(key)).unwrap());
        }

        // The sixth insert split the leaf at mid = 2: left {10, 20},
        // right {30, 40, 50, 60}, separator 30 in a new internal root.
        let root = bpm.fetch_page(tree.root_page_id()).unwrap();
        {
            let data = root.data();
            let node = InternalNode::new(&data[..]).unwrap();
            assert_eq!(node.size(), 1);
            assert_eq!(node.key_at(0), 30);
        }
        drop(root);

        for key in [10, 20, 30, 40, 50, 60] {
            assert_eq!(tree.search(key).unwrap(), Some(rid_for(key)));
        }
        assert_eq!(tree.search(25).unwrap(), None);
    }

    #[test]
    fn test_multi_level_splits() {
        let (_dir, bpm) = setup(30);
        let mut tree = BPlusTree::new(bpm, 3).unwrap();
        for key in 1..=20 {
            assert!(tree.insert(key, rid_for(key)).unwrap());
        }
        for key in 1..=20 {
            assert_eq!(tree.search(key).unwrap(), Some(rid_for(key)));
        }
        assert_eq!(tree.search(0).unwrap(), None);
        assert_eq!(tree.search(21).unwrap(), None);

        let entries = collect(&tree);
        assert_eq!(entries.len(), 20);
        assert_sorted_unique(&entries);
    }

    #[test]
    fn test_permuted_inserts_all_searchable() {
        let (_dir, bpm) = setup(50);
        let mut tree = BPlusTree::new(bpm, 4).unwrap();
        // 17 is coprime with 50, so this visits each key exactly once
        let keys: Vec<i32> = (0..50).map(|i| (i * 17) % 50).collect();
        for &key in &keys {
            assert!(tree.insert(key, rid_for(key)).unwrap());
        }
        for key in 0..50 {
            assert_eq!(tree.search(key).unwrap(), Some(rid_for(key)));
        }
        let entries = collect(&tree);
        assert_eq!(entries.len(), 50);
        assert_sorted_unique(&entries);
    }

    #[test]
    fn test_delete_miss_returns_false() {
        let (_dir, bpm) = setup(10);
        let mut tree = BPlusTree::new(bpm, 4).unwrap();
        tree.insert(1, rid_for(1)).unwrap();
        assert!(!tree.delete(2).unwrap());
        assert!(tree.delete(1).unwrap());
        assert!(!tree.delete(1).unwrap());
    }

    #[test]
    fn test_delete_sole_key_leaves_empty_root() {
        let (_dir, bpm) = setup(10);
        let mut tree = BPlusTree::new(bpm, 4).unwrap();
        tree.insert(42, rid_for(42)).unwrap();
        assert!(tree.delete(42).unwrap());
        assert_eq!(tree.search(42).unwrap(), None);
        assert!(collect(&tree).is_empty());
        // Still usable afterwards
        assert!(tree.insert(7, rid_for(7)).unwrap());
        assert_eq!(tree.search(7).unwrap(), Some(rid_for(7)));
    }

    #[test]
    fn test_underflow_merges_with_sibling() {
        let (_dir, bpm) = setup(20);
        let mut tree = BPlusTree::new(bpm, 4).unwrap();
        // Builds root {3, 5} over leaves {1,2} {3,4} {5,6,7,8}
        for key in 1..=8 {
            assert!(tree.insert(key, rid_for(key)).unwrap());
        }

        // Leaf {2} underflows (min_size = 2) and merges with {3,4};
        // the separator 3 leaves the parent.
        assert!(tree.delete(1).unwrap());

        let entries = collect(&tree);
        assert_eq!(entries.iter().map(|e| e.0).collect::<Vec<_>>(), vec![2, 3, 4, 5, 6, 7, 8]);
        for key in 2..=8 {
            assert_eq!(tree.search(key).unwrap(), Some(rid_for(key)));
        }
    }

    #[test]
    fn test_underflow_borrows_when_merge_would_overflow() {
        let (_dir, bpm) = setup(20);
        let mut tree = BPlusTree::new(bpm, 4).unwrap();
        // Leaves become {1,2} and {3,4,5,6}
        for key in 1..=6 {
            assert!(tree.insert(key, rid_for(key)).unwrap());
        }

        // {1} + {3,4,5,6} cannot merge into one node of four, so the
        // right sibling donates its first entry.
        assert!(tree.delete(2).unwrap());

        let entries = collect(&tree);
        assert_eq!(entries.iter().map(|e| e.0).collect::<Vec<_>>(), vec![1, 3, 4, 5, 6]);
        for key in [1, 3, 4, 5, 6] {
            assert_eq!(tree.search(key).unwrap(), Some(rid_for(key)));
        }
    }

    #[test]
    fn test_root_collapse_on_cascading_merge() {
        let (_dir, bpm) = setup(30);
        let mut tree = BPlusTree::new(bpm, 3).unwrap();
        for key in 1..=10 {
            assert!(tree.insert(key, rid_for(key)).unwrap());
        }
        for key in 1..=9 {
            assert!(tree.delete(key).unwrap(), "delete {key}");
            let entries = collect(&tree);
            assert_eq!(entries.len(), (10 - key) as usize);
            assert_sorted_unique(&entries);
        }
        assert_eq!(tree.search(10).unwrap(), Some(rid_for(10)));
    }

    #[test]
    fn test_interleaved_insert_delete_traversal() {
        let (_dir, bpm) = setup(50);
        let mut tree = BPlusTree::new(bpm, 4).unwrap();
        for key in 0..30 {
            assert!(tree.insert(key, rid_for(key)).unwrap());
        }
        for key in (0..30).filter(|k| k % 2 == 0) {
            assert!(tree.delete(key).unwrap());
        }
        for key in (0..30).filter(|k| k % 2 == 0) {
            assert_eq!(tree.search(key).unwrap(), None);
        }

        let entries = collect(&tree);
        let expected: Vec<i32> = (0..30).filter(|k| k % 2 == 1).collect();
        assert_eq!(entries.iter().map(|e| e.0).collect::<Vec<_>>(), expected);

        // Reinsert half of what was deleted and re-check
        for key in (0..30).filter(|k| k % 4 == 0) {
            assert!(tree.insert(key, rid_for(key)).unwrap());
        }
        let entries = collect(&tree);
        assert_sorted_unique(&entries);
        assert_eq!(entries.len(), 15 + 8);
    }

    #[test]
    fn test_range_scan() {
        let (_dir, bpm) = setup(30);
        let mut tree = BPlusTree::new(bpm, 4).unwrap();
        for key in (0..40).step_by(2) {
            assert!(tree.insert(key, rid_for(key)).unwrap());
        }

        let hits = tree.range(5, 15).unwrap();
        assert_eq!(hits.iter().map(|e| e.0).collect::<Vec<_>>(), vec![6, 8, 10, 12, 14]);
        assert!(tree.range(41, 99).unwrap().is_empty());
        let all = tree.range(i32::MIN, i32::MAX).unwrap();
        assert_eq!(all.len(), 20);
    }

    #[test]
    fn test_reopen_from_persisted_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        let root_page_id;
        {
            let disk = DiskManager::open(&path).unwrap();
            let bpm = Rc::new(BufferPoolManager::new(disk, 20));
            let mut tree = BPlusTree::new(Rc::clone(&bpm), 4).unwrap();
            for key in 1..=12 {
                tree.insert(key, rid_for(key)).unwrap();
            }
            root_page_id = tree.root_page_id();
            bpm.flush_all_pages().unwrap();
        }

        let disk = DiskManager::open(&path).unwrap();
        let bpm = Rc::new(BufferPoolManager::new(disk, 20));
        let tree = BPlusTree::open(bpm, root_page_id, 4);
        for key in 1..=12 {
            assert_eq!(tree.search(key).unwrap(), Some(rid_for(key)));
        }
        assert_eq!(collect(&tree).len(), 12);
    }

    #[test]
    fn test_saturated_pool_surfaces_no_available_frame() {
        let (_dir, bpm) = setup(1);
        let mut tree = BPlusTree::new(Rc::clone(&bpm), 4).unwrap();
        tree.insert(1, rid_for(1)).unwrap();

        // Hold the only frame hostage; the tree cannot pin its root.
        let hostage = bpm.new_page().unwrap();
        assert!(tree.insert(2, rid_for(2)).is_err());
        drop(hostage);
        assert!(tree.insert(2, rid_for(2)).unwrap());
    }
}
