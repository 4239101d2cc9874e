//! Error types for StratumDB.

use thiserror::Error;

/// Result type alias using StratumError.
pub type Result<T> = std::result::Result<T, StratumError>;

/// Errors that can occur in StratumDB storage operations.
#[derive(Debug, Error)]
pub enum StratumError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame id {frame_id} out of range (pool has {pool_size} frames)")]
    InvalidFrame { frame_id: u32, pool_size: usize },

    #[error("buffer pool exhausted, every frame is pinned")]
    PoolExhausted,

    #[error("invalid index name: {0:?}")]
    InvalidIndexName(String),

    #[error("header page full, cannot register another index")]
    HeaderPageFull,
}

impl StratumError {
    /// Returns true when the error is back-pressure rather than a fault:
    /// the caller may retry once pages have been unpinned.
    pub fn is_pool_exhausted(&self) -> bool {
        matches!(self, StratumError::PoolExhausted)
    }
}
