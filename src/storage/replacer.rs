use lru::LruCache;
use std::num::NonZeroUsize;

use super::FrameId;

/// Tracks the set of unpinned frames in use order and picks eviction
/// victims. Capacity equals the buffer pool size, so insertion never
/// silently drops an entry.
pub struct LruReplacer {
    frames: LruCache<FrameId, ()>,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap()),
        }
    }

    /// Remove and return the least-recently-used frame, or `None` if no
    /// frame is evictable.
    pub fn victim(&mut self) -> Option<FrameId> {
        self.frames.pop_lru().map(|(frame_id, ())| frame_id)
    }

    /// A pinned frame is in use and no longer a candidate. No-op if the
    /// frame is not tracked.
    pub fn pin(&mut self, frame_id: FrameId) {
        self.frames.pop(&frame_id);
    }

    /// Insert `frame_id` at the most-recently-used end, refreshing its
    /// position if already tracked.
    pub fn unpin(&mut self, frame_id: FrameId) {
        self.frames.put(frame_id, ());
    }

    /// Number of currently evictable frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
