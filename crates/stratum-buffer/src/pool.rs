//! Buffer pool manager.

use crate::frame::{Frame, FrameId};
use crate::page_table::PageTable;
use crate::replacer::{LruKReplacer, Replacer};
use log::debug;
use parking_lot::{Mutex, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;
use stratum_common::page::{PageId, PAGE_SIZE};
use stratum_common::{Result, StorageConfig, StratumError};
use stratum_disk::DiskManager;

/// Buffer pool manager.
///
/// Owns a fixed array of frames and mediates all page I/O through the disk
/// manager. Victim frames come from the free list first, then from the LRU-K
/// replacer; the page table maps resident page ids to frames.
///
/// One mutex serializes the bookkeeping: free list, page id counter, page
/// table and replacer calls, and frame metadata transitions. Disk I/O runs
/// under it as well, a deliberate simplicity trade. The per-page latches are
/// never acquired while a caller could hold the bookkeeping mutex through
/// another latch, which keeps the lock order acyclic.
pub struct BufferPoolManager {
    pool_size: usize,
    frames: Vec<Frame>,
    page_table: PageTable,
    replacer: LruKReplacer,
    disk: Arc<DiskManager>,
    state: Mutex<PoolState>,
}

struct PoolState {
    /// Frames holding no page.
    free_list: Vec<FrameId>,
    /// Monotonic page id allocator; freed ids are not recycled.
    next_page_id: u32,
}

impl BufferPoolManager {
    /// Creates a buffer pool over the given disk manager.
    ///
    /// Page id allocation continues after the last page of an existing data
    /// file, so reopening a store never reissues an id.
    pub fn new(config: &StorageConfig, disk: Arc<DiskManager>) -> Self {
        let pool_size = config.pool_size;
        let frames: Vec<_> = (0..pool_size).map(|i| Frame::new(FrameId(i as u32))).collect();
        let free_list: Vec<_> = (0..pool_size).map(|i| FrameId(i as u32)).collect();

        Self {
            pool_size,
            frames,
            page_table: PageTable::new(config.hash_bucket_size),
            replacer: LruKReplacer::new(pool_size, config.replacer_k),
            disk: Arc::clone(&disk),
            state: Mutex::new(PoolState {
                free_list,
                next_page_id: disk.num_pages(),
            }),
        }
    }

    /// Returns the number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Returns how many page ids have been handed out so far (on disk or by
    /// this pool). Zero means a completely fresh store.
    pub fn allocated_page_count(&self) -> u32 {
        self.state.lock().next_page_id
    }

    /// Returns true if the page is resident.
    pub fn contains(&self, page_id: PageId) -> bool {
        let _state = self.state.lock();
        self.page_table.find(&page_id).is_some()
    }

    /// Picks a frame for a new resident page: free list first, else an
    /// eviction victim (written back when dirty). The returned frame is
    /// reset and absent from the page table.
    fn allocate_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop() {
            return Ok(frame_id);
        }

        let victim = self.replacer.evict().ok_or(StratumError::PoolExhausted)?;
        let frame = &self.frames[victim.0 as usize];

        if let Some(old_page_id) = frame.page_id() {
            if frame.is_dirty() {
                let data = frame.read_data();
                if let Err(e) = self.disk.write_page(old_page_id, &data) {
                    drop(data);
                    // The victim stays resident and dirty; a later flush or
                    // eviction may still succeed.
                    self.replacer.record_access(victim)?;
                    self.replacer.set_evictable(victim, true)?;
                    return Err(e);
                }
                debug!("evicted dirty {} from {}", old_page_id, victim);
            }
            self.page_table.remove(&old_page_id);
        }
        frame.reset();
        Ok(victim)
    }

    /// Allocates a fresh page id and pins it into a frame.
    ///
    /// The page starts zeroed and clean; callers that initialize it must
    /// mark the guard dirty or the bytes will be lost on eviction.
    pub fn new_page(&self) -> Result<PageWriteGuard<'_>> {
        let mut state = self.state.lock();
        let frame_id = self.allocate_frame(&mut state)?;
        let page_id = PageId(state.next_page_id);
        state.next_page_id += 1;

        let frame = &self.frames[frame_id.0 as usize];
        frame.set_page_id(Some(page_id));
        frame.pin();
        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id)?;
        self.replacer.set_evictable(frame_id, false)?;
        drop(state);

        let latch = frame.write_data();
        Ok(PageWriteGuard {
            pool: self,
            page_id,
            latch: Some(latch),
            dirty: false,
        })
    }

    /// Pins the page into a frame, reading it from disk on a miss.
    fn fetch_frame(&self, page_id: PageId) -> Result<&Frame> {
        debug_assert!(page_id.is_valid(), "fetch of invalid page id");
        let mut state = self.state.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            let frame = &self.frames[frame_id.0 as usize];
            frame.pin();
            self.replacer.record_access(frame_id)?;
            self.replacer.set_evictable(frame_id, false)?;
            return Ok(frame);
        }

        let frame_id = self.allocate_frame(&mut state)?;
        let frame = &self.frames[frame_id.0 as usize];
        {
            let mut data = frame.write_data();
            if let Err(e) = self.disk.read_page(page_id, &mut data) {
                drop(data);
                state.free_list.push(frame_id);
                return Err(e);
            }
        }
        frame.set_page_id(Some(page_id));
        frame.pin();
        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id)?;
        self.replacer.set_evictable(frame_id, false)?;
        Ok(frame)
    }

    /// Fetches the page and latches it for reading.
    pub fn read_page(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let frame = self.fetch_frame(page_id)?;
        let latch = frame.read_data();
        Ok(PageReadGuard {
            pool: self,
            page_id,
            latch: Some(latch),
        })
    }

    /// Fetches the page and latches it for writing.
    pub fn write_page(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let frame = self.fetch_frame(page_id)?;
        let latch = frame.write_data();
        Ok(PageWriteGuard {
            pool: self,
            page_id,
            latch: Some(latch),
            dirty: false,
        })
    }

    /// Drops one pin on the page.
    ///
    /// Returns true iff the page is resident with a positive pin count. The
    /// dirty flag is sticky: passing false never clears it. A pin count
    /// reaching zero makes the frame evictable.
    pub fn unpin_page(&self, page_id: PageId, dirty: bool) -> bool {
        let _state = self.state.lock();
        let frame_id = match self.page_table.find(&page_id) {
            Some(f) => f,
            None => return false,
        };
        let frame = &self.frames[frame_id.0 as usize];
        if frame.pin_count() == 0 {
            return false;
        }
        if dirty {
            frame.set_dirty(true);
        }
        if frame.unpin() == 0 {
            self.replacer.set_evictable(frame_id, true).ok();
        }
        true
    }

    /// Writes the page to disk and clears its dirty flag.
    ///
    /// Returns false when the page is not resident. On a write failure the
    /// page stays dirty so a future flush can retry. The bookkeeping mutex
    /// is held across the write, which also keeps the frame from being
    /// evicted or deleted mid-flush.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let _state = self.state.lock();
        let frame_id = match self.page_table.find(&page_id) {
            Some(f) => f,
            None => return Ok(false),
        };
        let frame = &self.frames[frame_id.0 as usize];

        let data = frame.read_data();
        self.disk.write_page(page_id, &data)?;
        frame.set_dirty(false);
        Ok(true)
    }

    /// Flushes every resident page.
    pub fn flush_all_pages(&self) -> Result<()> {
        for frame in &self.frames {
            if let Some(page_id) = frame.page_id() {
                self.flush_page(page_id)?;
            }
        }
        Ok(())
    }

    /// Drops the page from the pool and deallocates it on disk.
    ///
    /// Returns true when the page is absent or successfully deleted, false
    /// when it is pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.state.lock();
        let frame_id = match self.page_table.find(&page_id) {
            Some(f) => f,
            None => return Ok(true),
        };
        let frame = &self.frames[frame_id.0 as usize];
        if frame.is_pinned() {
            return Ok(false);
        }
        self.replacer.remove(frame_id)?;
        self.page_table.remove(&page_id);
        frame.reset();
        state.free_list.push(frame_id);
        self.disk.deallocate_page(page_id)?;
        Ok(true)
    }
}

/// RAII read access to a page: one pin plus the page latch in read mode.
///
/// Dropping the guard releases the latch, then unpins.
pub struct PageReadGuard<'a> {
    pool: &'a BufferPoolManager,
    page_id: PageId,
    latch: Option<RwLockReadGuard<'a, Box<[u8; PAGE_SIZE]>>>,
}

impl PageReadGuard<'_> {
    /// Returns the page id.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page bytes.
    pub fn data(&self) -> &[u8; PAGE_SIZE] {
        self.latch.as_ref().expect("page latch held")
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        self.latch.take();
        self.pool.unpin_page(self.page_id, false);
    }
}

/// RAII write access to a page: one pin plus the page latch in write mode.
///
/// Mutators must call [`PageWriteGuard::mark_dirty`]; the flag is handed to
/// `unpin_page` when the guard drops, after the latch is released.
pub struct PageWriteGuard<'a> {
    pool: &'a BufferPoolManager,
    page_id: PageId,
    latch: Option<RwLockWriteGuard<'a, Box<[u8; PAGE_SIZE]>>>,
    dirty: bool,
}

impl PageWriteGuard<'_> {
    /// Returns the page id.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page bytes.
    pub fn data(&self) -> &[u8; PAGE_SIZE] {
        self.latch.as_ref().expect("page latch held")
    }

    /// Returns the page bytes for mutation.
    pub fn data_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        self.latch.as_mut().expect("page latch held")
    }

    /// Records that the page bytes were modified.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        self.latch.take();
        self.pool.unpin_page(self.page_id, self.dirty);
    }
}
