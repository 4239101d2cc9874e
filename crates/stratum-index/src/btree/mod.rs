//! Disk-backed concurrent B+ tree.
//!
//! Nodes are pages fetched through the buffer pool; on-page layouts live in
//! [`node`], keys in [`key`], the tree algorithms (latch crabbing, splits,
//! merges, redistribution) in [`tree`], and the leaf-chain cursor in
//! [`iterator`].

pub mod iterator;
pub mod key;
pub mod node;
pub mod tree;

pub use iterator::TreeIter;
pub use key::{FixedKey, IndexKey};
pub use tree::BPlusTree;
