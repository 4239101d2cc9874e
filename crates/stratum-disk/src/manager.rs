//! Disk manager for page-level file I/O.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use stratum_common::page::{PageId, PAGE_SIZE};
use stratum_common::{Result, StorageConfig};

/// Name of the data file inside the data directory.
const DATA_FILE: &str = "stratum.db";

/// Reads and writes fixed-size pages of a single data file.
///
/// The file is addressed by page id: page `n` lives at byte offset
/// `n * PAGE_SIZE`. The file grows lazily when a page beyond the current end
/// is written; deallocated pages are not reclaimed.
pub struct DiskManager {
    /// Open file handle and page count, guarded together.
    inner: Mutex<DiskInner>,
    /// Path to the data file.
    path: PathBuf,
    /// Call fsync after every write.
    fsync_enabled: bool,
}

struct DiskInner {
    file: File,
    /// Number of pages currently backed by the file.
    num_pages: u32,
}

impl DiskManager {
    /// Opens (or creates) the data file under `config.data_dir`.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let path = config.data_dir.join(DATA_FILE);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        Ok(Self {
            inner: Mutex::new(DiskInner { file, num_pages }),
            path,
            fsync_enabled: config.fsync_enabled,
        })
    }

    /// Returns the path of the data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the page into `buf`.
    ///
    /// A page that has never been written reads as all zeroes; the buffer
    /// pool relies on this when it fetches a freshly allocated page id.
    pub fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let mut inner = self.inner.lock();

        if page_id.0 >= inner.num_pages {
            buf.fill(0);
            return Ok(());
        }

        inner.file.seek(SeekFrom::Start(page_id.file_offset()))?;

        // A short read can only happen on the last, partially written page.
        let mut filled = 0;
        while filled < PAGE_SIZE {
            let n = inner.file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf[filled..].fill(0);
        Ok(())
    }

    /// Writes the page, extending the file if needed.
    pub fn write_page(&self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut inner = self.inner.lock();

        inner.file.seek(SeekFrom::Start(page_id.file_offset()))?;
        inner.file.write_all(buf)?;

        if self.fsync_enabled {
            inner.file.sync_all()?;
        }

        if page_id.0 >= inner.num_pages {
            inner.num_pages = page_id.0 + 1;
        }
        Ok(())
    }

    /// Releases the on-disk block of a deleted page.
    ///
    /// Freed page ids are not recycled, so this is bookkeeping only; the
    /// block stays in the file until it is rewritten.
    pub fn deallocate_page(&self, _page_id: PageId) -> Result<()> {
        Ok(())
    }

    /// Number of pages currently backed by the file.
    pub fn num_pages(&self) -> u32 {
        self.inner.lock().num_pages
    }

    /// Flushes pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.inner.lock().file.sync_all();
    }
}
