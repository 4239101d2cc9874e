//! Record identifiers.

use crate::page::PageId;
use serde::{Deserialize, Serialize};

/// Identifies a record by the page that holds it and its slot on that page.
///
/// Index leaves store record ids as their values. The index itself treats
/// them as opaque 8-byte payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId {
    /// Page holding the record.
    pub page_id: PageId,
    /// Slot number within the page.
    pub slot: u32,
}

impl RecordId {
    /// Encoded size on disk.
    pub const ENCODED_LEN: usize = 8;

    /// Creates a new record id.
    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }

    /// Packs the record id into a u64.
    pub fn as_u64(&self) -> u64 {
        ((self.page_id.0 as u64) << 32) | (self.slot as u64)
    }

    /// Unpacks a record id from a u64.
    pub fn from_u64(value: u64) -> Self {
        Self {
            page_id: PageId((value >> 32) as u32),
            slot: value as u32,
        }
    }

    /// Writes the 8-byte encoding into `buf`.
    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.page_id.0.to_le_bytes());
        buf[4..8].copy_from_slice(&self.slot.to_le_bytes());
    }

    /// Reads the 8-byte encoding from `buf`.
    pub fn decode(buf: &[u8]) -> Self {
        let page_id = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let slot = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Self {
            page_id: PageId(page_id),
            slot,
        }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page_id.0, self.slot)
    }
}
