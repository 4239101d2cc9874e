//! Configuration for the storage engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the storage core.
///
/// Every knob is fixed at construction time; components read the fields they
/// need and never mutate them afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for the data file.
    pub data_dir: PathBuf,
    /// Call fsync after every page write.
    pub fsync_enabled: bool,
    /// Number of frames in the buffer pool.
    pub pool_size: usize,
    /// K parameter of the LRU-K replacement policy.
    pub replacer_k: usize,
    /// Capacity of an extendible hash table bucket.
    pub hash_bucket_size: usize,
    /// Maximum number of entries in a B+ tree leaf page.
    pub leaf_max_size: usize,
    /// Maximum number of children of a B+ tree internal page.
    pub internal_max_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            fsync_enabled: true,
            pool_size: 1024,
            replacer_k: 2,
            hash_bucket_size: 4,
            leaf_max_size: 32,
            internal_max_size: 32,
        }
    }
}

impl StorageConfig {
    /// Total buffer pool size in bytes.
    pub fn pool_size_bytes(&self) -> usize {
        self.pool_size * crate::page::PAGE_SIZE
    }
}
