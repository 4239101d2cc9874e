//! B+ tree indexing for StratumDB.
//!
//! This crate builds the ordered index on top of the buffer pool: node page
//! layouts, the concurrent tree itself, its iterator, and the header page
//! that persists every index's root page id.

pub mod btree;
pub mod header;

pub use btree::{BPlusTree, FixedKey, IndexKey, TreeIter};
pub use header::{HeaderMut, HeaderRef, MAX_NAME_LEN, MAX_RECORDS};
