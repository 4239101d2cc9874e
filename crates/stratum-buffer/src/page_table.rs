//! Extendible hash table, used by the buffer pool as its page table.

use crate::frame::FrameId;
use log::debug;
use parking_lot::Mutex;
use stratum_common::page::PageId;

/// Page table mapping resident page ids to frame ids.
pub type PageTable = ExtendibleHashTable<PageId, FrameId>;

/// Stable hash used for directory indexing.
///
/// Integer-like keys hash to themselves, so directory slots follow the low
/// bits of the key. This keeps the directory layout deterministic and makes
/// collision behavior reproducible across runs.
pub trait StableHash {
    fn stable_hash(&self) -> u64;
}

impl StableHash for u32 {
    fn stable_hash(&self) -> u64 {
        *self as u64
    }
}

impl StableHash for u64 {
    fn stable_hash(&self) -> u64 {
        *self
    }
}

impl StableHash for i32 {
    fn stable_hash(&self) -> u64 {
        *self as u32 as u64
    }
}

impl StableHash for usize {
    fn stable_hash(&self) -> u64 {
        *self as u64
    }
}

impl StableHash for PageId {
    fn stable_hash(&self) -> u64 {
        self.0 as u64
    }
}

/// A thread-safe map with bounded bucket scans and dynamic growth through
/// directory doubling.
///
/// The directory has `2^G` slots (G = global depth), each referencing a
/// bucket with local depth `L <= G`; exactly `2^(G-L)` slots reference any
/// given bucket. When a bucket overflows it splits by bit `L` of the key
/// hash, doubling the directory first if `L == G`. Buckets never merge; the
/// arena holding them is freed when the table is dropped.
pub struct ExtendibleHashTable<K, V> {
    inner: Mutex<TableInner<K, V>>,
}

struct TableInner<K, V> {
    global_depth: u32,
    bucket_size: usize,
    /// Count of buckets produced by splits that left both halves populated.
    num_buckets: usize,
    /// Directory of indices into `buckets`.
    dir: Vec<usize>,
    /// Bucket arena; a bucket may be referenced by several directory slots.
    buckets: Vec<Bucket<K, V>>,
}

struct Bucket<K, V> {
    depth: u32,
    items: Vec<(K, V)>,
}

impl<K, V> Bucket<K, V> {
    fn new(depth: u32, capacity: usize) -> Self {
        Self {
            depth,
            items: Vec::with_capacity(capacity),
        }
    }
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: StableHash + Eq + Clone,
    V: Clone,
{
    /// Creates a table with the given bucket capacity, starting at global
    /// depth zero with a single bucket.
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size >= 1, "bucket size must be at least 1");
        Self {
            inner: Mutex::new(TableInner {
                global_depth: 0,
                bucket_size,
                num_buckets: 1,
                dir: vec![0],
                buckets: vec![Bucket::new(0, bucket_size)],
            }),
        }
    }

    /// Looks up the value for `key`.
    pub fn find(&self, key: &K) -> Option<V> {
        let inner = self.inner.lock();
        let bucket = &inner.buckets[inner.dir[inner.index_of(key)]];
        bucket
            .items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Inserts or overwrites the value for `key`.
    ///
    /// Splits the target bucket (doubling the directory when the local depth
    /// has caught up with the global depth) until the key fits. A
    /// pathological key set may force several consecutive doublings.
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock();

        while inner.buckets[inner.dir[inner.index_of(&key)]].items.len() >= inner.bucket_size {
            let slot = inner.index_of(&key);
            inner.split_bucket(slot);
        }

        let idx = inner.dir[inner.index_of(&key)];
        let bucket = &mut inner.buckets[idx];
        if let Some(pair) = bucket.items.iter_mut().find(|(k, _)| *k == key) {
            pair.1 = value;
        } else {
            bucket.items.push((key, value));
        }
    }

    /// Removes the entry for `key`. Returns true if it was present.
    ///
    /// Empty buckets are not merged; the table only shrinks when dropped.
    pub fn remove(&self, key: &K) -> bool {
        let mut inner = self.inner.lock();
        let idx = inner.dir[inner.index_of(key)];
        let bucket = &mut inner.buckets[idx];
        match bucket.items.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                bucket.items.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Returns the global depth of the directory.
    pub fn global_depth(&self) -> u32 {
        self.inner.lock().global_depth
    }

    /// Returns the local depth of the bucket at the given directory index.
    pub fn local_depth(&self, dir_index: usize) -> u32 {
        let inner = self.inner.lock();
        inner.buckets[inner.dir[dir_index]].depth
    }

    /// Returns the number of populated buckets.
    pub fn num_buckets(&self) -> usize {
        self.inner.lock().num_buckets
    }
}

impl<K, V> TableInner<K, V>
where
    K: StableHash + Eq + Clone,
    V: Clone,
{
    fn index_of(&self, key: &K) -> usize {
        let mask = (1u64 << self.global_depth) - 1;
        (key.stable_hash() & mask) as usize
    }

    /// Splits the bucket referenced by directory slot `slot`.
    ///
    /// The old bucket keeps the entries whose hash bit `L` is clear; a new
    /// bucket with local depth `L + 1` takes the rest, and every directory
    /// slot that referenced the old bucket is rewritten by bit `L` of its
    /// index.
    fn split_bucket(&mut self, slot: usize) {
        let old_idx = self.dir[slot];
        let local_depth = self.buckets[old_idx].depth;

        if local_depth == self.global_depth {
            // Double the directory: slot c + i references what slot i did.
            let capacity = self.dir.len();
            self.dir.extend_from_within(0..capacity);
            self.global_depth += 1;
            debug!("hash directory doubled to global depth {}", self.global_depth);
        }

        let mask = 1usize << local_depth;
        let items = std::mem::take(&mut self.buckets[old_idx].items);
        self.buckets[old_idx].depth = local_depth + 1;

        let new_idx = self.buckets.len();
        self.buckets
            .push(Bucket::new(local_depth + 1, self.bucket_size));

        let mut kept = Vec::with_capacity(items.len());
        let mut moved = Vec::with_capacity(items.len());
        for (k, v) in items {
            if (k.stable_hash() as usize) & mask != 0 {
                moved.push((k, v));
            } else {
                kept.push((k, v));
            }
        }
        let both_populated = !kept.is_empty() && !moved.is_empty();
        self.buckets[old_idx].items = kept;
        self.buckets[new_idx].items = moved;
        if both_populated {
            self.num_buckets += 1;
        }

        for i in 0..self.dir.len() {
            if self.dir[i] == old_idx && i & mask != 0 {
                self.dir[i] = new_idx;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_find() {
        let table: ExtendibleHashTable<u32, String> = ExtendibleHashTable::new(4);

        table.insert(1, "a".to_string());
        table.insert(2, "b".to_string());

        assert_eq!(table.find(&1), Some("a".to_string()));
        assert_eq!(table.find(&2), Some("b".to_string()));
        assert_eq!(table.find(&3), None);
    }

    #[test]
    fn test_other_integer_key_types() {
        // All integer keys hash to themselves, whatever their width.
        let table: ExtendibleHashTable<u64, u64> = ExtendibleHashTable::new(2);
        for k in 0..32u64 {
            table.insert(k, k * 10);
        }
        for k in 0..32u64 {
            assert_eq!(table.find(&k), Some(k * 10));
        }

        let table: ExtendibleHashTable<i32, &'static str> = ExtendibleHashTable::new(2);
        table.insert(-1, "minus one");
        table.insert(7, "seven");
        assert_eq!(table.find(&-1), Some("minus one"));
        assert_eq!(table.find(&7), Some("seven"));
        assert!(table.remove(&-1));
        assert_eq!(table.find(&-1), None);

        let table: ExtendibleHashTable<usize, usize> = ExtendibleHashTable::new(2);
        for k in 0..16usize {
            table.insert(k, k);
        }
        for k in 0..16usize {
            assert_eq!(table.find(&k), Some(k));
        }
    }

    #[test]
    fn test_insert_overwrites() {
        let table: ExtendibleHashTable<u32, u32> = ExtendibleHashTable::new(4);

        table.insert(1, 10);
        table.insert(1, 20);

        assert_eq!(table.find(&1), Some(20));
    }

    #[test]
    fn test_remove() {
        let table: ExtendibleHashTable<u32, u32> = ExtendibleHashTable::new(4);

        table.insert(1, 10);
        assert!(table.remove(&1));
        assert_eq!(table.find(&1), None);
        assert!(!table.remove(&1));
    }

    #[test]
    fn test_split_with_directory_double() {
        // Bucket size 2, keys 1, 5, 9 all share low bits: the insert of 9
        // keeps splitting until bit 2 separates 5 from 1 and 9.
        let table: ExtendibleHashTable<u32, char> = ExtendibleHashTable::new(2);
        assert_eq!(table.global_depth(), 0);

        table.insert(1, 'a');
        table.insert(5, 'b');
        table.insert(9, 'c');

        assert_eq!(table.global_depth(), 3);
        assert_eq!(table.find(&1), Some('a'));
        assert_eq!(table.find(&5), Some('b'));
        assert_eq!(table.find(&9), Some('c'));
    }

    #[test]
    fn test_split_distributes_entries() {
        // Keys 0..4 with bucket size 2: 0 and 2 part ways from 1 and 3 at
        // the first split.
        let table: ExtendibleHashTable<u32, u32> = ExtendibleHashTable::new(2);

        for k in 0..4 {
            table.insert(k, k * 100);
        }

        for k in 0..4 {
            assert_eq!(table.find(&k), Some(k * 100));
        }
        assert!(table.global_depth() >= 1);
        assert!(table.num_buckets() >= 2);
    }

    #[test]
    fn test_local_depth_invariant() {
        let table: ExtendibleHashTable<u32, u32> = ExtendibleHashTable::new(2);
        for k in 0..16 {
            table.insert(k, k);
        }

        let g = table.global_depth();
        for i in 0..(1usize << g) {
            assert!(table.local_depth(i) <= g);
        }
    }

    #[test]
    fn test_last_writer_wins_property() {
        let table: ExtendibleHashTable<u32, u32> = ExtendibleHashTable::new(3);

        for round in 0..3u32 {
            for k in 0..64u32 {
                table.insert(k, k + round * 1000);
            }
        }
        for k in 0..64u32 {
            assert_eq!(table.find(&k), Some(k + 2000));
        }
    }

    #[test]
    fn test_many_inserts_and_removes() {
        let table: ExtendibleHashTable<u32, u32> = ExtendibleHashTable::new(4);

        for k in 0..256 {
            table.insert(k, k);
        }
        for k in (0..256).step_by(2) {
            assert!(table.remove(&k));
        }
        for k in 0..256 {
            let expected = if k % 2 == 0 { None } else { Some(k) };
            assert_eq!(table.find(&k), expected);
        }
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;

        let table: Arc<ExtendibleHashTable<u32, u32>> = Arc::new(ExtendibleHashTable::new(4));
        let mut handles = Vec::new();

        for t in 0..4u32 {
            let table = Arc::clone(&table);
            handles.push(std::thread::spawn(move || {
                for i in 0..250u32 {
                    let k = t * 1000 + i;
                    table.insert(k, k);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        for t in 0..4u32 {
            for i in 0..250u32 {
                let k = t * 1000 + i;
                assert_eq!(table.find(&k), Some(k));
            }
        }
    }
}
