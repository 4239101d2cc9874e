//! Page replacement policies for the buffer pool.

use crate::frame::FrameId;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use stratum_common::{Result, StratumError};

/// Trait for page replacement algorithms.
pub trait Replacer: Send + Sync {
    /// Records that the given frame was accessed.
    fn record_access(&self, frame_id: FrameId) -> Result<()>;

    /// Marks a frame as evictable or pinned. No-op for a frame that has
    /// never been accessed.
    fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> Result<()>;

    /// Selects a victim frame for eviction.
    ///
    /// Returns None if no frame is evictable.
    fn evict(&self) -> Option<FrameId>;

    /// Forcibly drops a frame's access history. The caller guarantees the
    /// frame is evictable or was never accessed.
    fn remove(&self, frame_id: FrameId) -> Result<()>;

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;
}

/// LRU-K replacement policy.
///
/// Frames with fewer than K recorded accesses have infinite backward
/// K-distance and are evicted first, oldest recorded access winning. Frames
/// with K or more accesses are ordered by their K-th most recent access.
///
/// Two queues realize this: a history list for frames below K accesses
/// (insertion-ordered; an access below K does not move a frame) and a cache
/// list for the rest (moved to the front on every access). Eviction scans
/// the history list from its cold end first, then the cache list.
pub struct LruKReplacer {
    num_frames: usize,
    k: usize,
    inner: Mutex<LruKInner>,
}

struct LruKInner {
    /// Recorded access count per frame.
    access_count: HashMap<FrameId, usize>,
    /// Frames currently eligible for eviction.
    evictable: HashSet<FrameId>,
    /// Frames with fewer than K accesses, most recent insertion at the front.
    history: VecDeque<FrameId>,
    /// Frames with at least K accesses, most recently accessed at the front.
    cache: VecDeque<FrameId>,
}

impl LruKReplacer {
    /// Creates a replacer for `num_frames` frames with parameter `k`.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k >= 1, "LRU-K requires k >= 1");
        Self {
            num_frames,
            k,
            inner: Mutex::new(LruKInner {
                access_count: HashMap::new(),
                evictable: HashSet::new(),
                history: VecDeque::new(),
                cache: VecDeque::new(),
            }),
        }
    }

    fn check_frame(&self, frame_id: FrameId) -> Result<()> {
        if (frame_id.0 as usize) >= self.num_frames {
            return Err(StratumError::InvalidFrame {
                frame_id: frame_id.0,
                pool_size: self.num_frames,
            });
        }
        Ok(())
    }
}

fn remove_from(queue: &mut VecDeque<FrameId>, frame_id: FrameId) {
    if let Some(pos) = queue.iter().position(|&f| f == frame_id) {
        queue.remove(pos);
    }
}

impl Replacer for LruKReplacer {
    fn record_access(&self, frame_id: FrameId) -> Result<()> {
        self.check_frame(frame_id)?;
        let mut inner = self.inner.lock();

        let count = inner.access_count.entry(frame_id).or_insert(0);
        *count += 1;
        let count = *count;

        if count == self.k {
            // Graduates from the history list to the cache list.
            remove_from(&mut inner.history, frame_id);
            inner.cache.push_front(frame_id);
        } else if count > self.k {
            remove_from(&mut inner.cache, frame_id);
            inner.cache.push_front(frame_id);
        } else if !inner.history.contains(&frame_id) {
            // Below K the frame keeps its original position; only the first
            // access enqueues it.
            inner.history.push_front(frame_id);
        }
        Ok(())
    }

    fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> Result<()> {
        self.check_frame(frame_id)?;
        let mut inner = self.inner.lock();

        if inner.access_count.get(&frame_id).copied().unwrap_or(0) == 0 {
            return Ok(());
        }
        if evictable {
            inner.evictable.insert(frame_id);
        } else {
            inner.evictable.remove(&frame_id);
        }
        Ok(())
    }

    fn evict(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();

        if inner.evictable.is_empty() {
            return None;
        }

        // History frames have infinite backward K-distance; the one whose
        // first access is oldest sits at the back.
        let victim = inner
            .history
            .iter()
            .rev()
            .copied()
            .find(|f| inner.evictable.contains(f))
            .or_else(|| {
                inner
                    .cache
                    .iter()
                    .rev()
                    .copied()
                    .find(|f| inner.evictable.contains(f))
            })?;

        remove_from(&mut inner.history, victim);
        remove_from(&mut inner.cache, victim);
        inner.access_count.remove(&victim);
        inner.evictable.remove(&victim);
        Some(victim)
    }

    fn remove(&self, frame_id: FrameId) -> Result<()> {
        self.check_frame(frame_id)?;
        let mut inner = self.inner.lock();

        let count = match inner.access_count.remove(&frame_id) {
            Some(c) => c,
            None => return Ok(()),
        };
        if count >= self.k {
            remove_from(&mut inner.cache, frame_id);
        } else {
            remove_from(&mut inner.history, frame_id);
        }
        inner.evictable.remove(&frame_id);
        Ok(())
    }

    fn size(&self) -> usize {
        self.inner.lock().evictable.len()
    }
}
