//! Leaf-chain cursor over the tree.

use crate::btree::key::IndexKey;
use crate::btree::node::LeafRef;
use std::marker::PhantomData;
use stratum_buffer::{BufferPoolManager, PageReadGuard};
use stratum_common::rid::RecordId;
use stratum_common::Result;

/// Forward cursor over `(key, record id)` pairs in ascending key order.
///
/// The cursor pins and read-latches exactly one leaf at a time. Crossing a
/// leaf boundary acquires the next leaf's latch before releasing the current
/// one, so a concurrent split can never skip the cursor past entries.
///
/// Iteration yields `Result` items: a buffer pool failure while stepping to
/// the next leaf surfaces as an `Err` and ends the iteration.
pub struct TreeIter<'a, K> {
    bpm: &'a BufferPoolManager,
    leaf: Option<PageReadGuard<'a>>,
    index: usize,
    _key: PhantomData<K>,
}

impl<'a, K: IndexKey> TreeIter<'a, K> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, leaf: PageReadGuard<'a>, index: usize) -> Self {
        Self {
            bpm,
            leaf: Some(leaf),
            index,
            _key: PhantomData,
        }
    }

    /// Cursor past the end; what an empty tree's `iter` returns.
    pub(crate) fn exhausted(bpm: &'a BufferPoolManager) -> Self {
        Self {
            bpm,
            leaf: None,
            index: 0,
            _key: PhantomData,
        }
    }
}

impl<K: IndexKey> Iterator for TreeIter<'_, K> {
    type Item = Result<(K, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let guard = self.leaf.as_ref()?;
            let leaf = LeafRef::<K>::new(guard.data());

            if self.index < leaf.size() {
                let item = (leaf.key_at(self.index), leaf.value_at(self.index));
                self.index += 1;
                return Some(Ok(item));
            }

            let next_id = leaf.next_page_id();
            if !next_id.is_valid() {
                self.leaf = None;
                return None;
            }
            // Latch coupling: hold the current leaf until the next one is
            // latched, then let the assignment release it.
            match self.bpm.read_page(next_id) {
                Ok(next) => {
                    self.leaf = Some(next);
                    self.index = 0;
                }
                Err(e) => {
                    self.leaf = None;
                    return Some(Err(e));
                }
            }
        }
    }
}
