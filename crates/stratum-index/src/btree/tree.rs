//! B+ tree operations: lookup, insert, delete.
//!
//! Every node lives in a page fetched through the buffer pool. Traversals
//! latch pages top-down (latch crabbing): readers release each ancestor as
//! soon as the child is latched; writers keep a page set of guards and drop
//! all ancestors the moment a child proves safe. Dropping a guard releases
//! the page latch and unpins, so the page set doubles as the operation's
//! epilogue on every path.

use crate::btree::iterator::TreeIter;
use crate::btree::key::IndexKey;
use crate::btree::node::{
    internal_capacity, leaf_capacity, node_kind, node_max_size, node_min_size, node_parent,
    node_size, set_node_parent, InternalMut, InternalRef, LeafMut, LeafRef, NodeKind,
};
use crate::header::{HeaderMut, HeaderRef};
use log::debug;
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use stratum_buffer::{BufferPoolManager, PageReadGuard, PageWriteGuard};
use stratum_common::page::{PageId, HEADER_PAGE_ID, PAGE_SIZE};
use stratum_common::rid::RecordId;
use stratum_common::{Result, StorageConfig};

/// Which kind of structural change a write descent must guard against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOp {
    Insert,
    Delete,
}

/// Disk-resident B+ tree index mapping fixed-size keys to record ids.
///
/// The root page id is mirrored into the header page whenever it changes, so
/// reopening the store finds the tree again by name.
pub struct BPlusTree<K: IndexKey> {
    index_name: String,
    bpm: Arc<BufferPoolManager>,
    leaf_max_size: usize,
    internal_max_size: usize,
    /// Raw root page id; `PageId::INVALID` when the tree is empty.
    root_page_id: AtomicU32,
    /// Serializes installation of the first root.
    root_latch: Mutex<()>,
    _key: PhantomData<K>,
}

impl<K: IndexKey> BPlusTree<K> {
    /// Opens the index called `name`, creating its header page record (and
    /// the header page itself on a fresh store) as needed.
    pub fn new(name: &str, bpm: Arc<BufferPoolManager>, config: &StorageConfig) -> Result<Self> {
        let leaf_max_size = config.leaf_max_size;
        let internal_max_size = config.internal_max_size;
        assert!(
            (2..=leaf_capacity::<K>(PAGE_SIZE)).contains(&leaf_max_size),
            "leaf_max_size must fit a page"
        );
        assert!(
            (3..=internal_capacity::<K>(PAGE_SIZE)).contains(&internal_max_size),
            "internal_max_size must fit a page"
        );

        let root = if bpm.allocated_page_count() == 0 {
            // Fresh store: the first allocation is the header page.
            let mut guard = bpm.new_page()?;
            debug_assert_eq!(guard.page_id(), HEADER_PAGE_ID);
            HeaderMut::init(guard.data_mut());
            HeaderMut::new(guard.data_mut()).insert_record(name, PageId::INVALID)?;
            guard.mark_dirty();
            PageId::INVALID
        } else {
            let mut guard = bpm.write_page(HEADER_PAGE_ID)?;
            match HeaderRef::new(guard.data()).get_root(name) {
                Some(root) => root,
                None => {
                    HeaderMut::new(guard.data_mut()).insert_record(name, PageId::INVALID)?;
                    guard.mark_dirty();
                    PageId::INVALID
                }
            }
        };

        Ok(Self {
            index_name: name.to_string(),
            bpm,
            leaf_max_size,
            internal_max_size,
            root_page_id: AtomicU32::new(root.0),
            root_latch: Mutex::new(()),
            _key: PhantomData,
        })
    }

    /// Returns the current root page id (`PageId::INVALID` when empty).
    pub fn root_page_id(&self) -> PageId {
        PageId(self.root_page_id.load(Ordering::Acquire))
    }

    /// Returns true when the tree holds no keys.
    pub fn is_empty(&self) -> bool {
        !self.root_page_id().is_valid()
    }

    /// Publishes a root change to memory and to the header page.
    fn set_root(&self, new_root: PageId) -> Result<()> {
        self.root_page_id.store(new_root.0, Ordering::Release);
        let mut guard = self.bpm.write_page(HEADER_PAGE_ID)?;
        HeaderMut::new(guard.data_mut()).update_record(&self.index_name, new_root)?;
        guard.mark_dirty();
        debug!("index {:?} root is now {}", self.index_name, new_root);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    /// Descends to the leaf that may hold `key`, read-latching.
    ///
    /// Each ancestor latch is released as soon as the child latch is held.
    /// Returns None when the tree is empty.
    fn find_leaf_read(&self, key: &K) -> Result<Option<PageReadGuard<'_>>> {
        let mut guard = loop {
            let root_id = self.root_page_id();
            if !root_id.is_valid() {
                return Ok(None);
            }
            let guard = self.bpm.read_page(root_id)?;
            // The root can move between the load and the latch; re-check.
            if self.root_page_id() == root_id {
                break guard;
            }
        };

        loop {
            match node_kind(guard.data()) {
                NodeKind::Leaf => return Ok(Some(guard)),
                NodeKind::Internal => {
                    let child = InternalRef::<K>::new(guard.data()).lookup(key);
                    let next = self.bpm.read_page(child)?;
                    guard = next;
                }
            }
        }
    }

    /// Point lookup.
    pub fn get_value(&self, key: &K) -> Result<Option<RecordId>> {
        let guard = match self.find_leaf_read(key)? {
            Some(g) => g,
            None => return Ok(None),
        };
        Ok(LeafRef::<K>::new(guard.data()).lookup(key))
    }

    /// A node is safe when a mutation below it cannot cascade upward.
    fn is_safe(data: &[u8], op: WriteOp) -> bool {
        match op {
            WriteOp::Insert => node_size(data) < node_max_size(data),
            WriteOp::Delete => {
                if !node_parent(data).is_valid() {
                    // A leaf root may shrink arbitrarily; an internal root
                    // with a single separator may still collapse.
                    match node_kind(data) {
                        NodeKind::Leaf => true,
                        NodeKind::Internal => node_size(data) > 2,
                    }
                } else {
                    node_size(data) > node_min_size(data)
                }
            }
        }
    }

    /// Descends to the leaf for `key` with write latches, keeping the
    /// crabbing page set: ancestors are released en masse whenever the
    /// freshly latched child is safe. The leaf is last in the returned set.
    fn find_leaf_write(&self, key: &K, op: WriteOp) -> Result<Option<Vec<PageWriteGuard<'_>>>> {
        let mut guards = loop {
            let root_id = self.root_page_id();
            if !root_id.is_valid() {
                return Ok(None);
            }
            let guard = self.bpm.write_page(root_id)?;
            if self.root_page_id() == root_id {
                break vec![guard];
            }
        };

        loop {
            let child = {
                let current = guards.last().expect("descent keeps the current node latched");
                match node_kind(current.data()) {
                    NodeKind::Leaf => return Ok(Some(guards)),
                    NodeKind::Internal => InternalRef::<K>::new(current.data()).lookup(key),
                }
            };
            let child_guard = self.bpm.write_page(child)?;
            if Self::is_safe(child_guard.data(), op) {
                guards.clear();
            }
            guards.push(child_guard);
        }
    }

    // -----------------------------------------------------------------------
    // Insert
    // -----------------------------------------------------------------------

    /// Inserts `key -> rid`. Returns false when the key already exists.
    pub fn insert(&self, key: &K, rid: RecordId) -> Result<bool> {
        loop {
            match self.find_leaf_write(key, WriteOp::Insert)? {
                Some(guards) => return self.insert_into_leaf(guards, key, rid),
                None => {
                    // Empty tree: install a leaf root under the tree latch,
                    // then retry the descent (another writer may have won).
                    let _bootstrap = self.root_latch.lock();
                    if self.is_empty() {
                        let mut guard = self.bpm.new_page()?;
                        let page_id = guard.page_id();
                        LeafMut::<K>::init(
                            guard.data_mut(),
                            page_id,
                            PageId::INVALID,
                            self.leaf_max_size,
                        );
                        guard.mark_dirty();
                        drop(guard);
                        self.set_root(page_id)?;
                    }
                }
            }
        }
    }

    fn insert_into_leaf<'a>(
        &'a self,
        mut guards: Vec<PageWriteGuard<'a>>,
        key: &K,
        rid: RecordId,
    ) -> Result<bool> {
        let leaf_guard = guards.last_mut().expect("descent returned a leaf");
        let (index, size, old_next) = {
            let leaf = LeafRef::<K>::new(leaf_guard.data());
            (leaf.key_index(key), leaf.size(), leaf.next_page_id())
        };

        if size < self.leaf_max_size {
            let inserted = LeafMut::<K>::new(leaf_guard.data_mut()).insert_at(index, key, &rid);
            if inserted {
                leaf_guard.mark_dirty();
            }
            return Ok(inserted);
        }

        // Overflow. Duplicates are rejected without any structural change.
        {
            let leaf = LeafRef::<K>::new(leaf_guard.data());
            if index < size && leaf.key_at(index) == *key {
                return Ok(false);
            }
        }

        // Split through a padded temporary: the lower half stays, the upper
        // half moves to a fresh right sibling.
        let mut entries = LeafRef::<K>::new(leaf_guard.data()).entries();
        entries.insert(index, (*key, rid));
        let split_at = (entries.len() + 1) / 2;
        let upper = entries.split_off(split_at);
        let separator = upper[0].0;

        let mut sibling_guard = self.bpm.new_page()?;
        let sibling_id = sibling_guard.page_id();
        let leaf_id = leaf_guard.page_id();

        {
            let mut leaf = LeafMut::<K>::new(leaf_guard.data_mut());
            leaf.write_entries(&entries);
            leaf.set_next_page_id(sibling_id);
        }
        leaf_guard.mark_dirty();

        LeafMut::<K>::init(
            sibling_guard.data_mut(),
            sibling_id,
            PageId::INVALID,
            self.leaf_max_size,
        );
        {
            let mut sibling = LeafMut::<K>::new(sibling_guard.data_mut());
            sibling.write_entries(&upper);
            sibling.set_next_page_id(old_next);
        }
        sibling_guard.mark_dirty();
        debug!("leaf {} split, new sibling {}", leaf_id, sibling_id);

        self.insert_in_parent(&mut guards, separator, &mut sibling_guard)?;
        Ok(true)
    }

    /// Splices a freshly split-off `right` sibling into the tree above
    /// `guards.last()`, growing a new root when the left node was the root.
    fn insert_in_parent<'a>(
        &'a self,
        guards: &mut Vec<PageWriteGuard<'a>>,
        separator: K,
        right: &mut PageWriteGuard<'a>,
    ) -> Result<()> {
        let (left_id, parent_id) = {
            let left = guards.last().expect("split node is latched");
            (left.page_id(), node_parent(left.data()))
        };

        if !parent_id.is_valid() {
            // The split node was the root: grow the tree by one level.
            let mut root_guard = self.bpm.new_page()?;
            let root_id = root_guard.page_id();
            InternalMut::<K>::init(
                root_guard.data_mut(),
                root_id,
                PageId::INVALID,
                self.internal_max_size,
            );
            InternalMut::<K>::new(root_guard.data_mut()).populate_new_root(
                left_id,
                &separator,
                right.page_id(),
            );
            root_guard.mark_dirty();
            drop(root_guard);

            let left_guard = guards.last_mut().expect("split node is latched");
            set_node_parent(left_guard.data_mut(), root_id);
            left_guard.mark_dirty();
            set_node_parent(right.data_mut(), root_id);
            right.mark_dirty();

            self.set_root(root_id)?;
            return Ok(());
        }

        let mut left_guard = guards.pop().expect("split node is latched");
        let right_id = right.page_id();

        let parent_has_room = {
            let parent = guards.last().expect("unsafe ancestors stay latched");
            debug_assert_eq!(parent.page_id(), parent_id);
            node_size(parent.data()) < self.internal_max_size
        };

        if parent_has_room {
            let parent_guard = guards.last_mut().expect("unsafe ancestors stay latched");
            InternalMut::<K>::new(parent_guard.data_mut()).insert(&separator, right_id);
            parent_guard.mark_dirty();
            set_node_parent(right.data_mut(), parent_id);
            right.mark_dirty();
            guards.push(left_guard);
            return Ok(());
        }

        // The parent itself overflows: split it through a padded temporary
        // and recurse with the promoted separator.
        let (mut entries, index) = {
            let parent = InternalRef::<K>::new(guards.last().expect("parent latched").data());
            (parent.entries(), parent.key_index(&separator))
        };
        entries.insert(index, (separator, right_id));
        let split_at = (entries.len() + 1) / 2;
        let upper = entries.split_off(split_at);
        let promoted = upper[0].0;

        let mut sibling_guard = self.bpm.new_page()?;
        let sibling_id = sibling_guard.page_id();
        InternalMut::<K>::init(
            sibling_guard.data_mut(),
            sibling_id,
            PageId::INVALID,
            self.internal_max_size,
        );
        InternalMut::<K>::new(sibling_guard.data_mut()).write_entries(&upper);
        sibling_guard.mark_dirty();

        {
            let parent_guard = guards.last_mut().expect("parent latched");
            InternalMut::<K>::new(parent_guard.data_mut()).write_entries(&entries);
            parent_guard.mark_dirty();
        }

        // The just-inserted right sibling may have landed in either half.
        if index < split_at {
            set_node_parent(right.data_mut(), parent_id);
            right.mark_dirty();
        }

        // Children migrated into the new sibling get their parent pointer
        // rewritten, under their own latch. The two nodes this operation
        // already holds are patched through their guards.
        for &(_, child_id) in &upper {
            if child_id == right_id {
                set_node_parent(right.data_mut(), sibling_id);
                right.mark_dirty();
            } else if child_id == left_guard.page_id() {
                set_node_parent(left_guard.data_mut(), sibling_id);
                left_guard.mark_dirty();
            } else {
                let mut child_guard = self.bpm.write_page(child_id)?;
                set_node_parent(child_guard.data_mut(), sibling_id);
                child_guard.mark_dirty();
            }
        }
        debug!("internal {} split, new sibling {}", parent_id, sibling_id);

        self.insert_in_parent(guards, promoted, &mut sibling_guard)?;
        guards.push(left_guard);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    /// Removes `key`. Deleting an absent key is a no-op.
    pub fn remove(&self, key: &K) -> Result<()> {
        let mut guards = match self.find_leaf_write(key, WriteOp::Delete)? {
            Some(g) => g,
            None => return Ok(()),
        };
        let mut deleted = Vec::new();
        self.delete_entry(&mut guards, *key, &mut deleted)?;
        drop(guards);
        // Pages emptied by merges are returned to the pool only after every
        // latch is released.
        for page_id in deleted {
            self.bpm.delete_page(page_id)?;
        }
        Ok(())
    }

    /// Removes `key` from `guards.last()` and rebalances upward.
    fn delete_entry<'a>(
        &'a self,
        guards: &mut Vec<PageWriteGuard<'a>>,
        key: K,
        deleted: &mut Vec<PageId>,
    ) -> Result<()> {
        let mut node_guard = guards.pop().expect("delete_entry needs the current node");
        let is_leaf = node_kind(node_guard.data()) == NodeKind::Leaf;

        let removed = if is_leaf {
            LeafMut::<K>::new(node_guard.data_mut()).remove(&key)
        } else {
            InternalMut::<K>::new(node_guard.data_mut()).remove(&key)
        };
        if !removed {
            return Ok(());
        }
        node_guard.mark_dirty();

        let node_id = node_guard.page_id();
        let size = node_size(node_guard.data());

        if self.root_page_id() == node_id {
            if is_leaf && size == 0 {
                // The last key is gone; the tree is empty again.
                self.set_root(PageId::INVALID)?;
                deleted.push(node_id);
                debug!("index {:?} is now empty", self.index_name);
            } else if !is_leaf && size == 1 {
                // An internal root with a single child hands the root role
                // to that child.
                let child_id = InternalRef::<K>::new(node_guard.data()).child_at(0);
                {
                    let mut child_guard = self.bpm.write_page(child_id)?;
                    set_node_parent(child_guard.data_mut(), PageId::INVALID);
                    child_guard.mark_dirty();
                }
                self.set_root(child_id)?;
                deleted.push(node_id);
                debug!("root collapsed into {}", child_id);
            }
            return Ok(());
        }

        if size >= node_min_size(node_guard.data()) {
            return Ok(());
        }

        // Underflow: obtain a sibling through the parent, preferring the
        // left one, then merge or redistribute.
        let (sibling_id, separator, separator_index, sibling_is_left) = {
            let parent = InternalRef::<K>::new(
                guards.last().expect("underflowing node kept its parent").data(),
            );
            let i = parent
                .child_index_of(node_id)
                .expect("node is registered in its parent");
            if i > 0 {
                (parent.child_at(i - 1), parent.key_at(i), i, true)
            } else {
                (parent.child_at(i + 1), parent.key_at(i + 1), i + 1, false)
            }
        };
        let mut sibling_guard = self.bpm.write_page(sibling_id)?;
        let sibling_size = node_size(sibling_guard.data());

        if sibling_size + size <= node_max_size(node_guard.data()) {
            // Merge into the left-hand neighbour and delete the separator
            // from the parent.
            let (mut left_guard, right_guard) = if sibling_is_left {
                (sibling_guard, node_guard)
            } else {
                (node_guard, sibling_guard)
            };
            let left_id = left_guard.page_id();
            let right_id = right_guard.page_id();

            if is_leaf {
                let mut merged = LeafRef::<K>::new(left_guard.data()).entries();
                merged.extend(LeafRef::<K>::new(right_guard.data()).entries());
                let right_next = LeafRef::<K>::new(right_guard.data()).next_page_id();
                let mut left = LeafMut::<K>::new(left_guard.data_mut());
                left.write_entries(&merged);
                left.set_next_page_id(right_next);
            } else {
                // The separator comes down in front of the right node's
                // first child; migrated children are reparented.
                let mut merged = InternalRef::<K>::new(left_guard.data()).entries();
                let right_entries = InternalRef::<K>::new(right_guard.data()).entries();
                for (i, &(entry_key, child_id)) in right_entries.iter().enumerate() {
                    let entry_key = if i == 0 { separator } else { entry_key };
                    merged.push((entry_key, child_id));
                }
                InternalMut::<K>::new(left_guard.data_mut()).write_entries(&merged);
                for &(_, child_id) in &right_entries {
                    let mut child_guard = self.bpm.write_page(child_id)?;
                    set_node_parent(child_guard.data_mut(), left_id);
                    child_guard.mark_dirty();
                }
            }
            left_guard.mark_dirty();
            deleted.push(right_id);
            debug!("merged {} into {}", right_id, left_id);
            drop(left_guard);
            drop(right_guard);

            return self.delete_entry(guards, separator, deleted);
        }

        // Redistribute: move one entry across the boundary and rewrite the
        // parent's separator.
        if is_leaf {
            if sibling_is_left {
                let (moved_key, moved_value) = {
                    let sibling = LeafRef::<K>::new(sibling_guard.data());
                    let last = sibling.size() - 1;
                    (sibling.key_at(last), sibling.value_at(last))
                };
                LeafMut::<K>::new(sibling_guard.data_mut()).remove(&moved_key);
                LeafMut::<K>::new(node_guard.data_mut()).insert_at(0, &moved_key, &moved_value);
                let parent_guard = guards.last_mut().expect("parent latched");
                InternalMut::<K>::new(parent_guard.data_mut())
                    .set_key_at(separator_index, &moved_key);
                parent_guard.mark_dirty();
            } else {
                let (moved_key, moved_value) = {
                    let sibling = LeafRef::<K>::new(sibling_guard.data());
                    (sibling.key_at(0), sibling.value_at(0))
                };
                LeafMut::<K>::new(sibling_guard.data_mut()).remove(&moved_key);
                let end = node_size(node_guard.data());
                LeafMut::<K>::new(node_guard.data_mut()).insert_at(end, &moved_key, &moved_value);
                let new_separator = LeafRef::<K>::new(sibling_guard.data()).key_at(0);
                let parent_guard = guards.last_mut().expect("parent latched");
                InternalMut::<K>::new(parent_guard.data_mut())
                    .set_key_at(separator_index, &new_separator);
                parent_guard.mark_dirty();
            }
        } else if sibling_is_left {
            // The left sibling's last child moves over; its key replaces the
            // separator, which rotates down in front of the moved child.
            let (moved_key, moved_child) = {
                let sibling = InternalRef::<K>::new(sibling_guard.data());
                let last = sibling.size() - 1;
                (sibling.key_at(last), sibling.child_at(last))
            };
            InternalMut::<K>::new(sibling_guard.data_mut()).remove(&moved_key);
            InternalMut::<K>::new(node_guard.data_mut()).insert_first(&separator, moved_child);
            {
                let mut child_guard = self.bpm.write_page(moved_child)?;
                set_node_parent(child_guard.data_mut(), node_id);
                child_guard.mark_dirty();
            }
            let parent_guard = guards.last_mut().expect("parent latched");
            InternalMut::<K>::new(parent_guard.data_mut()).set_key_at(separator_index, &moved_key);
            parent_guard.mark_dirty();
        } else {
            // The right sibling's first child moves over under the old
            // separator; the sibling's first key becomes the new separator.
            let (moved_child, new_separator) = {
                let sibling = InternalRef::<K>::new(sibling_guard.data());
                (sibling.child_at(0), sibling.key_at(1))
            };
            InternalMut::<K>::new(sibling_guard.data_mut()).delete_first();
            InternalMut::<K>::new(node_guard.data_mut()).insert(&separator, moved_child);
            {
                let mut child_guard = self.bpm.write_page(moved_child)?;
                set_node_parent(child_guard.data_mut(), node_id);
                child_guard.mark_dirty();
            }
            let parent_guard = guards.last_mut().expect("parent latched");
            InternalMut::<K>::new(parent_guard.data_mut())
                .set_key_at(separator_index, &new_separator);
            parent_guard.mark_dirty();
        }
        sibling_guard.mark_dirty();
        node_guard.mark_dirty();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Iteration
    // -----------------------------------------------------------------------

    /// Cursor over the whole tree in ascending key order.
    pub fn iter(&self) -> Result<TreeIter<'_, K>> {
        let mut guard = loop {
            let root_id = self.root_page_id();
            if !root_id.is_valid() {
                return Ok(TreeIter::exhausted(&self.bpm));
            }
            let guard = self.bpm.read_page(root_id)?;
            if self.root_page_id() == root_id {
                break guard;
            }
        };

        loop {
            match node_kind(guard.data()) {
                NodeKind::Leaf => return Ok(TreeIter::new(&self.bpm, guard, 0)),
                NodeKind::Internal => {
                    let child = InternalRef::<K>::new(guard.data()).child_at(0);
                    let next = self.bpm.read_page(child)?;
                    guard = next;
                }
            }
        }
    }

    /// Cursor positioned at the first key >= `key`.
    pub fn iter_from(&self, key: &K) -> Result<TreeIter<'_, K>> {
        match self.find_leaf_read(key)? {
            Some(guard) => {
                let index = LeafRef::<K>::new(guard.data()).key_index(key);
                Ok(TreeIter::new(&self.bpm, guard, index))
            }
            None => Ok(TreeIter::exhausted(&self.bpm)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_disk::DiskManager;
    use tempfile::tempdir;

    fn small_config(dir: &std::path::Path) -> StorageConfig {
        StorageConfig {
            data_dir: dir.to_path_buf(),
            fsync_enabled: false,
            pool_size: 64,
            leaf_max_size: 3,
            internal_max_size: 3,
            ..Default::default()
        }
    }

    fn open_tree(config: &StorageConfig) -> (BPlusTree<u64>, Arc<BufferPoolManager>) {
        let disk = Arc::new(DiskManager::open(config).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(config, disk));
        let tree = BPlusTree::new("test_index", Arc::clone(&bpm), config).unwrap();
        (tree, bpm)
    }

    fn rid(n: u64) -> RecordId {
        RecordId::new(PageId(n as u32), n as u32)
    }

    #[test]
    fn test_empty_tree() {
        let dir = tempdir().unwrap();
        let (tree, _bpm) = open_tree(&small_config(dir.path()));

        assert!(tree.is_empty());
        assert_eq!(tree.get_value(&1).unwrap(), None);
        assert_eq!(tree.iter().unwrap().count(), 0);
    }

    #[test]
    fn test_insert_and_lookup() {
        let dir = tempdir().unwrap();
        let (tree, _bpm) = open_tree(&small_config(dir.path()));

        assert!(tree.insert(&1, rid(1)).unwrap());
        assert!(tree.insert(&2, rid(2)).unwrap());
        assert!(!tree.is_empty());

        assert_eq!(tree.get_value(&1).unwrap(), Some(rid(1)));
        assert_eq!(tree.get_value(&2).unwrap(), Some(rid(2)));
        assert_eq!(tree.get_value(&3).unwrap(), None);
    }

    #[test]
    fn test_duplicate_insert_returns_false() {
        let dir = tempdir().unwrap();
        let (tree, _bpm) = open_tree(&small_config(dir.path()));

        assert!(tree.insert(&7, rid(1)).unwrap());
        assert!(!tree.insert(&7, rid(2)).unwrap());
        assert_eq!(tree.get_value(&7).unwrap(), Some(rid(1)));
    }

    #[test]
    fn test_sequential_insert_structure() {
        // leaf_max = internal_max = 3; inserting 1..=5 in order leaves a
        // root with separator 3 over leaves [1,2] and [3,4,5].
        let dir = tempdir().unwrap();
        let config = small_config(dir.path());
        let (tree, bpm) = open_tree(&config);

        for k in 1..=5u64 {
            assert!(tree.insert(&k, rid(k)).unwrap());
        }

        assert_eq!(tree.get_value(&4).unwrap(), Some(rid(4)));
        assert_eq!(tree.get_value(&6).unwrap(), None);

        let root_id = tree.root_page_id();
        let root_guard = bpm.read_page(root_id).unwrap();
        assert_eq!(node_kind(root_guard.data()), NodeKind::Internal);
        let root = InternalRef::<u64>::new(root_guard.data());
        assert_eq!(root.size(), 2);
        assert_eq!(root.key_at(1), 3);

        let left = bpm.read_page(root.child_at(0)).unwrap();
        let right = bpm.read_page(root.child_at(1)).unwrap();
        assert_eq!(LeafRef::<u64>::new(left.data()).entries().iter().map(|e| e.0).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(LeafRef::<u64>::new(right.data()).entries().iter().map(|e| e.0).collect::<Vec<_>>(), vec![3, 4, 5]);
    }

    #[test]
    fn test_delete_redistributes_from_right_sibling() {
        // Continues from the 1..=5 structure: removing 1 underflows the left
        // leaf; one entry moves over and the separator becomes 4.
        let dir = tempdir().unwrap();
        let config = small_config(dir.path());
        let (tree, bpm) = open_tree(&config);

        for k in 1..=5u64 {
            tree.insert(&k, rid(k)).unwrap();
        }
        tree.remove(&1).unwrap();

        let root_guard = bpm.read_page(tree.root_page_id()).unwrap();
        let root = InternalRef::<u64>::new(root_guard.data());
        assert_eq!(root.key_at(1), 4);

        let left = bpm.read_page(root.child_at(0)).unwrap();
        let right = bpm.read_page(root.child_at(1)).unwrap();
        assert_eq!(LeafRef::<u64>::new(left.data()).entries().iter().map(|e| e.0).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(LeafRef::<u64>::new(right.data()).entries().iter().map(|e| e.0).collect::<Vec<_>>(), vec![4, 5]);
    }

    #[test]
    fn test_first_split_happens_at_overflow() {
        let dir = tempdir().unwrap();
        let config = small_config(dir.path());
        let (tree, bpm) = open_tree(&config);

        // leaf_max keys fill the root leaf without splitting.
        for k in 1..=3u64 {
            tree.insert(&k, rid(k)).unwrap();
        }
        let root_guard = bpm.read_page(tree.root_page_id()).unwrap();
        assert_eq!(node_kind(root_guard.data()), NodeKind::Leaf);
        drop(root_guard);

        // The overflowing insert produces exactly one split.
        tree.insert(&4, rid(4)).unwrap();
        let root_guard = bpm.read_page(tree.root_page_id()).unwrap();
        assert_eq!(node_kind(root_guard.data()), NodeKind::Internal);
        assert_eq!(InternalRef::<u64>::new(root_guard.data()).size(), 2);
    }

    #[test]
    fn test_delete_last_key_empties_tree() {
        let dir = tempdir().unwrap();
        let (tree, _bpm) = open_tree(&small_config(dir.path()));

        tree.insert(&1, rid(1)).unwrap();
        tree.remove(&1).unwrap();

        assert!(tree.is_empty());
        assert_eq!(tree.root_page_id(), PageId::INVALID);
        assert_eq!(tree.get_value(&1).unwrap(), None);
    }

    #[test]
    fn test_remove_absent_key_is_noop() {
        let dir = tempdir().unwrap();
        let (tree, _bpm) = open_tree(&small_config(dir.path()));

        tree.remove(&9).unwrap();
        tree.insert(&1, rid(1)).unwrap();
        tree.remove(&9).unwrap();
        assert_eq!(tree.get_value(&1).unwrap(), Some(rid(1)));
    }

    #[test]
    fn test_root_registered_in_header_page() {
        let dir = tempdir().unwrap();
        let config = small_config(dir.path());
        let (tree, bpm) = open_tree(&config);

        tree.insert(&1, rid(1)).unwrap();
        let root_id = tree.root_page_id();

        let guard = bpm.read_page(HEADER_PAGE_ID).unwrap();
        assert_eq!(HeaderRef::new(guard.data()).get_root("test_index"), Some(root_id));
    }

    #[test]
    fn test_reopen_finds_root() {
        let dir = tempdir().unwrap();
        let config = small_config(dir.path());

        {
            let (tree, bpm) = open_tree(&config);
            for k in 1..=10u64 {
                tree.insert(&k, rid(k)).unwrap();
            }
            bpm.flush_all_pages().unwrap();
        }

        let (tree, _bpm) = open_tree(&config);
        assert!(!tree.is_empty());
        for k in 1..=10u64 {
            assert_eq!(tree.get_value(&k).unwrap(), Some(rid(k)));
        }
    }
}
