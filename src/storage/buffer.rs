use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use tracing::{debug, trace};

use super::disk::DiskManager;
use super::error::{StorageError, StorageResult};
use super::page::PageMut;
use super::replacer::LruReplacer;
use super::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// One slot of the buffer pool. The pin count and dirty flag live in
/// `Cell`s and the bytes behind a `RefCell` so the pool can hand out
/// multiple concurrently pinned pages from `&self`; the engine is
/// single-threaded by contract.
struct Frame {
    data: RefCell<Box<[u8; PAGE_SIZE]>>,
    pin_count: Cell<u32>,
    is_dirty: Cell<bool>,
    /// Page currently resident in this frame, `INVALID_PAGE_ID` when free
    page_id: Cell<PageId>,
}

impl Frame {
    fn new() -> Self {
        Self {
            data: RefCell::new(Box::new([0u8; PAGE_SIZE])),
            pin_count: Cell::new(0),
            is_dirty: Cell::new(false),
            page_id: Cell::new(INVALID_PAGE_ID),
        }
    }
}

struct PoolState {
    /// page id -> frame id for every resident page
    page_table: HashMap<PageId, FrameId>,
    /// Never-used or released frames, popped FIFO
    free_list: VecDeque<FrameId>,
    replacer: LruReplacer,
}

/// Caches pages in a fixed number of frames, pinning them for safe use by
/// callers, writing dirty pages back on eviction, and selecting victims
/// via LRU over the unpinned frames.
pub struct BufferPoolManager {
    frames: Vec<Rc<Frame>>,
    state: RefCell<PoolState>,
    disk: RefCell<DiskManager>,
}

impl BufferPoolManager {
    pub fn new(disk: DiskManager, pool_size: usize) -> Self {
        assert!(pool_size > 0, "buffer pool needs at least one frame");
        let frames = (0..pool_size).map(|_| Rc::new(Frame::new())).collect();
        let free_list = (0..pool_size as FrameId).collect();
        Self {
            frames,
            state: RefCell::new(PoolState {
                page_table: HashMap::new(),
                free_list,
                replacer: LruReplacer::new(pool_size),
            }),
            disk: RefCell::new(disk),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    /// Fetch `page_id` into a frame, reading from disk on a miss. The
    /// returned guard holds a pin until dropped.
    pub fn fetch_page(&self, page_id: PageId) -> StorageResult<PageGuard<'_>> {
        if page_id < 0 {
            return Err(StorageError::InvalidPageId(page_id));
        }

        let mut state = self.state.borrow_mut();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.frames[frame_id as usize];
            let pins = frame.pin_count.get() + 1;
            frame.pin_count.set(pins);
            if pins == 1 {
                state.replacer.pin(frame_id);
            }
            trace!(page_id, frame_id, pins, "fetch hit");
            return Ok(PageGuard::new(self, page_id, Rc::clone(frame)));
        }

        let frame_id = self.find_victim(&mut state)?;
        let frame = &self.frames[frame_id as usize];

        if let Err(err) = self
            .disk
            .borrow_mut()
            .read_page(page_id, &mut frame.data.borrow_mut()[..])
        {
            // The frame was detached from its old page; return it to the
            // free list rather than leaking it.
            state.free_list.push_back(frame_id);
            return Err(err);
        }

        frame.pin_count.set(1);
        frame.is_dirty.set(false);
        frame.page_id.set(page_id);
        state.page_table.insert(page_id, frame_id);
        state.replacer.pin(frame_id);
        trace!(page_id, frame_id, "fetch miss, loaded from disk");

        Ok(PageGuard::new(self, page_id, Rc::clone(frame)))
    }

    /// Allocate a brand new page and pin it. The frame is zero-filled and
    /// initialized with a slotted-page header; the page is dirty until
    /// flushed.
    pub fn new_page(&self) -> StorageResult<PageGuard<'_>> {
        let mut state = self.state.borrow_mut();
        let frame_id = self.find_victim(&mut state)?;
        let page_id = self.disk.borrow_mut().allocate_page();

        let frame = &self.frames[frame_id as usize];
        PageMut::init(&mut frame.data.borrow_mut()[..], page_id);
        frame.pin_count.set(1);
        frame.is_dirty.set(true);
        frame.page_id.set(page_id);
        state.page_table.insert(page_id, frame_id);
        state.replacer.pin(frame_id);
        debug!(page_id, frame_id, "allocated new page");

        Ok(PageGuard::new(self, page_id, Rc::clone(frame)))
    }

    /// Drop one pin on `page_id`, ORing `dirty` into the frame's flag.
    /// Returns false if the page is not resident or not pinned.
    pub fn unpin_page(&self, page_id: PageId, dirty: bool) -> bool {
        let mut state = self.state.borrow_mut();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id as usize];
        let pins = frame.pin_count.get();
        if pins == 0 {
            return false;
        }
        frame.pin_count.set(pins - 1);
        if dirty {
            frame.is_dirty.set(true);
        }
        if pins == 1 {
            state.replacer.unpin(frame_id);
        }
        true
    }

    /// Write `page_id` back to disk if resident and dirty. Flushing a
    /// clean page is a successful no-op; returns `Ok(false)` only when the
    /// page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> StorageResult<bool> {
        let state = self.state.borrow();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(false);
        };
        let frame = &self.frames[frame_id as usize];
        if frame.is_dirty.get() {
            self.disk
                .borrow_mut()
                .write_page(page_id, &frame.data.borrow()[..])?;
            frame.is_dirty.set(false);
            trace!(page_id, "flushed");
        }
        Ok(true)
    }

    /// Flush every resident dirty page, then sync the file.
    pub fn flush_all_pages(&self) -> StorageResult<()> {
        let resident: Vec<PageId> = self.state.borrow().page_table.keys().copied().collect();
        for page_id in resident {
            self.flush_page(page_id)?;
        }
        self.disk.borrow_mut().sync()
    }

    /// Drop `page_id` from the pool and hand its id back to the disk
    /// manager's free-list. Refuses while pinned. Deallocates on disk even
    /// if the page was never cached.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut state = self.state.borrow_mut();
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.frames[frame_id as usize];
            if frame.pin_count.get() > 0 {
                return false;
            }
            state.replacer.pin(frame_id);
            state.page_table.remove(&page_id);
            frame.is_dirty.set(false);
            frame.page_id.set(INVALID_PAGE_ID);
            state.free_list.push_back(frame_id);
        }
        self.disk.borrow_mut().deallocate_page(page_id);
        debug!(page_id, "deleted page");
        true
    }

    /// Free frame first, else evict the LRU victim (flushing it if dirty).
    fn find_victim(&self, state: &mut PoolState) -> StorageResult<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = state
            .replacer
            .victim()
            .ok_or(StorageError::NoAvailableFrame(self.frames.len()))?;

        let frame = &self.frames[frame_id as usize];
        let old_page_id = frame.page_id.get();
        if frame.is_dirty.get() {
            debug!(page_id = old_page_id, frame_id, "flushing dirty victim");
            self.disk
                .borrow_mut()
                .write_page(old_page_id, &frame.data.borrow()[..])?;
            frame.is_dirty.set(false);
        }
        state.page_table.remove(&old_page_id);
        frame.page_id.set(INVALID_PAGE_ID);
        Ok(frame_id)
    }

    /// Whether `page_id` currently occupies a frame.
    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.state.borrow().page_table.contains_key(&page_id)
    }

    pub fn resident_count(&self) -> usize {
        self.state.borrow().page_table.len()
    }

    pub fn dirty_page_count(&self) -> usize {
        self.frames
            .iter()
            .filter(|f| f.page_id.get() != INVALID_PAGE_ID && f.is_dirty.get())
            .count()
    }

    /// Number of frames the replacer could evict right now.
    pub fn evictable_count(&self) -> usize {
        self.state.borrow().replacer.len()
    }
}

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        let _ = self.flush_all_pages();
    }
}

/// A pinned page. Dropping the guard unpins with the dirty flag
/// accumulated through `data_mut`/`mark_dirty`. The frame bytes are only
/// valid while the guard lives; eviction cannot touch a pinned frame.
pub struct PageGuard<'a> {
    pool: &'a BufferPoolManager,
    page_id: PageId,
    frame: Rc<Frame>,
    dirty: Cell<bool>,
}

impl<'a> PageGuard<'a> {
    fn new(pool: &'a BufferPoolManager, page_id: PageId, frame: Rc<Frame>) -> Self {
        Self {
            pool,
            page_id,
            frame,
            dirty: Cell::new(false),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> Ref<'_, [u8]> {
        Ref::map(self.frame.data.borrow(), |b| &b[..])
    }

    /// Mutable access to the page bytes; marks the pin dirty.
    pub fn data_mut(&self) -> RefMut<'_, [u8]> {
        self.dirty.set(true);
        RefMut::map(self.frame.data.borrow_mut(), |b| &mut b[..])
    }

    /// Record that the page was modified without borrowing the bytes.
    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, self.dirty.get());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(pool_size: usize) -> (TempDir, BufferPoolManager) {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskManager::open(dir.path().join("test.db")).unwrap();
        (dir, BufferPoolManager::new(disk, pool_size))
    }

    /// Create `n` pages and unpin them all; returns their ids in order.
    fn seed_pages(pool: &BufferPoolManager, n: usize) -> Vec<PageId> {
        (0..n).map(|_| pool.new_page().unwrap().page_id()).collect()
    }

    #[test]
    fn test_new_page_starts_pinned_and_dirty() {
        let (_dir, pool) = setup(4);
        let guard = pool.new_page().unwrap();
        assert_eq!(guard.page_id(), 0);
        assert_eq!(pool.evictable_count(), 0);
        assert_eq!(pool.dirty_page_count(), 1);
        drop(guard);
        assert_eq!(pool.evictable_count(), 1);
    }

    #[test]
    fn test_fetch_invalid_page_id() {
        let (_dir, pool) = setup(2);
        assert!(matches!(
            pool.fetch_page(-1),
            Err(StorageError::InvalidPageId(-1))
        ));
    }

    #[test]
    fn test_unpin_semantics() {
        let (_dir, pool) = setup(2);
        let id = pool.new_page().unwrap().page_id();
        // The guard already unpinned on drop
        assert!(!pool.unpin_page(id, false));
        // Unpin of a page that was never resident
        assert!(!pool.unpin_page(99, false));
    }

    #[test]
    fn test_lru_eviction_order() {
        let (_dir, pool) = setup(3);
        let ids = seed_pages(&pool, 3);

        // Touch pages 0 and 1 so page 2 becomes least recently used
        drop(pool.fetch_page(ids[0]).unwrap());
        drop(pool.fetch_page(ids[1]).unwrap());

        let fresh = pool.new_page().unwrap();
        assert!(!pool.is_resident(ids[2]));
        assert!(pool.is_resident(ids[0]));
        assert!(pool.is_resident(ids[1]));
        drop(fresh);

        // Still cache hits
        assert!(pool.is_resident(ids[0]));
        assert!(pool.is_resident(ids[1]));
    }

    #[test]
    fn test_pin_prevents_eviction() {
        let (_dir, pool) = setup(3);
        let g0 = pool.new_page().unwrap();
        let id0 = g0.page_id();
        seed_pages(&pool, 2);
        let g0_again = pool.fetch_page(id0).unwrap(); // pin count 2

        // Two evictions possible, then the pool is exhausted
        let a = pool.new_page().unwrap();
        let b = pool.new_page().unwrap();
        assert!(matches!(
            pool.new_page(),
            Err(StorageError::NoAvailableFrame(3))
        ));
        assert!(pool.is_resident(id0));
        drop((a, b, g0_again, g0));
    }

    #[test]
    fn test_capacity_one_pool() {
        let (_dir, pool) = setup(1);
        let id0 = pool.new_page().unwrap().page_id();
        let g1 = pool.new_page().unwrap(); // evicts page 0

        assert!(matches!(
            pool.fetch_page(id0),
            Err(StorageError::NoAvailableFrame(1))
        ));
        drop(g1);

        let g0 = pool.fetch_page(id0).unwrap();
        assert_eq!(g0.page_id(), id0);
    }

    #[test]
    fn test_dirty_page_written_back_on_eviction() {
        let (_dir, pool) = setup(2);
        let id0;
        {
            let guard = pool.new_page().unwrap();
            id0 = guard.page_id();
            guard.data_mut()[..5].copy_from_slice(b"hello");
        }

        // Force id0 out of the pool
        seed_pages(&pool, 2);
        assert!(!pool.is_resident(id0));

        let guard = pool.fetch_page(id0).unwrap();
        assert_eq!(&guard.data()[..5], b"hello");
    }

    #[test]
    fn test_flush_page_semantics() {
        let (_dir, pool) = setup(2);
        let id = pool.new_page().unwrap().page_id();

        assert!(pool.flush_page(id).unwrap());
        assert_eq!(pool.dirty_page_count(), 0);
        // Flushing a clean page is a successful no-op
        assert!(pool.flush_page(id).unwrap());
        // Not resident
        assert!(!pool.flush_page(1234).unwrap());
    }

    #[test]
    fn test_delete_page_refuses_while_pinned() {
        let (_dir, pool) = setup(2);
        let guard = pool.new_page().unwrap();
        let id = guard.page_id();
        assert!(!pool.delete_page(id));
        drop(guard);
        assert!(pool.delete_page(id));
        assert!(!pool.is_resident(id));
    }

    #[test]
    fn test_deleted_page_id_is_reused() {
        let (_dir, pool) = setup(4);
        let id = pool.new_page().unwrap().page_id();
        assert!(pool.flush_page(id).unwrap());
        assert!(pool.delete_page(id));

        // The disk free-list hands the id back
        let guard = pool.new_page().unwrap();
        assert_eq!(guard.page_id(), id);
    }

    #[test]
    fn test_replacer_tracks_exactly_unpinned_resident_frames() {
        let (_dir, pool) = setup(4);
        let ids = seed_pages(&pool, 3);
        assert_eq!(pool.evictable_count(), 3);

        let g = pool.fetch_page(ids[1]).unwrap();
        assert_eq!(pool.evictable_count(), 2);
        drop(g);
        assert_eq!(pool.evictable_count(), 3);
        assert_eq!(pool.resident_count(), 3);
    }

    #[test]
    fn test_drop_flushes_dirty_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let id;
        {
            let disk = DiskManager::open(&path).unwrap();
            let pool = BufferPoolManager::new(disk, 2);
            let guard = pool.new_page().unwrap();
            id = guard.page_id();
            guard.data_mut()[100] = 42;
        }

        let disk = DiskManager::open(&path).unwrap();
        let pool = BufferPoolManager::new(disk, 2);
        let guard = pool.fetch_page(id).unwrap();
        assert_eq!(guard.data()[100], 42);
    }
}
