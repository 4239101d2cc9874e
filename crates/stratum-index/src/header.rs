//! The header page: index name to root page id registry.
//!
//! Page id 0 holds an associative array of fixed 36-byte records, a record
//! count in front:
//!
//! ```text
//! +-------+----------------------------+-----+
//! | count | name (32, zero-padded)+root| ... |
//! +-------+----------------------------+-----+
//! ```
//!
//! Every tree rewrites its record (fetch, mutate, unpin dirty) whenever its
//! root page id changes.

use bytes::{BufMut, BytesMut};
use stratum_common::page::{PageId, PAGE_SIZE};
use stratum_common::{Result, StratumError};

/// Longest allowed index name.
pub const MAX_NAME_LEN: usize = 32;

const COUNT_OFF: usize = 4;
const RECORD_LEN: usize = MAX_NAME_LEN + 4;
/// Records the header page can hold.
pub const MAX_RECORDS: usize = (PAGE_SIZE - COUNT_OFF) / RECORD_LEN;

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(StratumError::InvalidIndexName(name.to_string()));
    }
    Ok(())
}

fn record_off(index: usize) -> usize {
    COUNT_OFF + index * RECORD_LEN
}

fn encode_record(name: &str, root: PageId) -> BytesMut {
    let mut buf = BytesMut::with_capacity(RECORD_LEN);
    buf.put_slice(name.as_bytes());
    buf.put_bytes(0, MAX_NAME_LEN - name.len());
    buf.put_u32_le(root.0);
    buf
}

/// Read-only view of the header page.
pub struct HeaderRef<'a> {
    data: &'a [u8],
}

impl<'a> HeaderRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Number of registered indexes.
    pub fn record_count(&self) -> usize {
        u32::from_le_bytes([self.data[0], self.data[1], self.data[2], self.data[3]]) as usize
    }

    fn name_at(&self, index: usize) -> &[u8] {
        let off = record_off(index);
        let name = &self.data[off..off + MAX_NAME_LEN];
        let len = name.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LEN);
        &name[..len]
    }

    fn find(&self, name: &str) -> Option<usize> {
        (0..self.record_count()).find(|&i| self.name_at(i) == name.as_bytes())
    }

    /// Root page id registered under `name`.
    pub fn get_root(&self, name: &str) -> Option<PageId> {
        let off = record_off(self.find(name)?) + MAX_NAME_LEN;
        Some(PageId(u32::from_le_bytes([
            self.data[off],
            self.data[off + 1],
            self.data[off + 2],
            self.data[off + 3],
        ])))
    }
}

/// Mutable view of the header page.
pub struct HeaderMut<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data }
    }

    /// Formats `data` as an empty header page.
    pub fn init(data: &mut [u8]) {
        data[0..COUNT_OFF].copy_from_slice(&0u32.to_le_bytes());
    }

    pub fn as_ref(&self) -> HeaderRef<'_> {
        HeaderRef::new(self.data)
    }

    fn set_record_count(&mut self, count: usize) {
        self.data[0..COUNT_OFF].copy_from_slice(&(count as u32).to_le_bytes());
    }

    fn write_record(&mut self, index: usize, name: &str, root: PageId) {
        let record = encode_record(name, root);
        let off = record_off(index);
        self.data[off..off + RECORD_LEN].copy_from_slice(&record);
    }

    /// Registers a new index. Returns false when the name is taken.
    pub fn insert_record(&mut self, name: &str, root: PageId) -> Result<bool> {
        validate_name(name)?;
        if self.as_ref().find(name).is_some() {
            return Ok(false);
        }
        let count = self.as_ref().record_count();
        if count >= MAX_RECORDS {
            return Err(StratumError::HeaderPageFull);
        }
        self.write_record(count, name, root);
        self.set_record_count(count + 1);
        Ok(true)
    }

    /// Rewrites an existing record. Returns false when the name is unknown.
    pub fn update_record(&mut self, name: &str, root: PageId) -> Result<bool> {
        validate_name(name)?;
        match self.as_ref().find(name) {
            Some(index) => {
                self.write_record(index, name, root);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drops a record. Returns false when the name is unknown.
    pub fn delete_record(&mut self, name: &str) -> Result<bool> {
        validate_name(name)?;
        let index = match self.as_ref().find(name) {
            Some(i) => i,
            None => return Ok(false),
        };
        let count = self.as_ref().record_count();
        let start = record_off(index + 1);
        let end = record_off(count);
        self.data.copy_within(start..end, record_off(index));
        self.set_record_count(count - 1);
        Ok(true)
    }
}
