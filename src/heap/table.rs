use std::rc::Rc;

use crate::storage::{BufferPoolManager, PageId, PageMut, PageRef, Rid};

use super::error::{HeapError, HeapResult};
use super::iterator::TableIterator;
use super::Tuple;

/// Unordered record storage across a list of slotted pages. Inserts go to
/// the last page, allocating a new one when it is full. The page list is
/// the heap's own state (persisted by the catalog); pages of different
/// tables and index nodes interleave freely in the database file.
pub struct TableHeap {
    bpm: Rc<BufferPoolManager>,
    pages: Vec<PageId>,
}

impl TableHeap {
    /// Create a heap with one empty page.
    pub fn create(bpm: Rc<BufferPoolManager>) -> HeapResult<Self> {
        let first = bpm.new_page()?.page_id();
        Ok(Self {
            bpm,
            pages: vec![first],
        })
    }

    /// Reattach a heap from its persisted page list.
    pub fn open(bpm: Rc<BufferPoolManager>, pages: Vec<PageId>) -> Self {
        debug_assert!(!pages.is_empty());
        Self { bpm, pages }
    }

    pub fn first_page_id(&self) -> PageId {
        self.pages[0]
    }

    pub fn last_page_id(&self) -> PageId {
        *self.pages.last().unwrap()
    }

    pub fn pages(&self) -> &[PageId] {
        &self.pages
    }

    /// Insert a tuple, trying the last page first and growing the heap by
    /// one page if it is full.
    pub fn insert_tuple(&mut self, data: &[u8]) -> HeapResult<Rid> {
        if data.is_empty() || data.len() > PageMut::max_record_size() {
            return Err(HeapError::TupleTooLarge(data.len()));
        }

        {
            let guard = self.bpm.fetch_page(self.last_page_id())?;
            let fits = {
                let page = guard.data();
                let view = PageRef::new(&page);
                view.free_space() >= data.len()
            };
            if fits {
                let mut page = guard.data_mut();
                if let Some(rid) = PageMut::new(&mut page).insert_record(data) {
                    return Ok(rid);
                }
            }
        }

        let guard = self.bpm.new_page()?;
        self.pages.push(guard.page_id());
        let mut page = guard.data_mut();
        let rid = PageMut::new(&mut page)
            .insert_record(data)
            .expect("fresh page must accept a record that fits in a page");
        Ok(rid)
    }

    /// Read the tuple at `rid`. Returns `Ok(None)` if the Rid is invalid,
    /// the slot is tombstoned, or the slot was reused since.
    pub fn get_tuple(&self, rid: Rid) -> HeapResult<Option<Tuple>> {
        if !rid.is_valid() {
            return Ok(None);
        }
        let guard = self.bpm.fetch_page(rid.page_id)?;
        let page = guard.data();
        let view = PageRef::new(&page);
        Ok(view
            .get_record(rid)
            .map(|bytes| Tuple::with_rid(bytes.to_vec(), rid)))
    }

    /// Tombstone the tuple at `rid`. Returns false if it was not there.
    pub fn delete_tuple(&mut self, rid: Rid) -> HeapResult<bool> {
        if !rid.is_valid() {
            return Ok(false);
        }
        let guard = self.bpm.fetch_page(rid.page_id)?;
        let live = {
            let page = guard.data();
            PageRef::new(&page).get_record(rid).is_some()
        };
        if !live {
            return Ok(false);
        }
        let mut page = guard.data_mut();
        Ok(PageMut::new(&mut page).delete_record(rid))
    }

    /// Overwrite the tuple at `rid` in place. Returns false if the Rid is
    /// stale or the page cannot hold the new payload.
    pub fn update_tuple(&mut self, rid: Rid, data: &[u8]) -> HeapResult<bool> {
        if !rid.is_valid() {
            return Ok(false);
        }
        if data.is_empty() || data.len() > PageMut::max_record_size() {
            return Err(HeapError::TupleTooLarge(data.len()));
        }
        let guard = self.bpm.fetch_page(rid.page_id)?;
        let live = {
            let page = guard.data();
            PageRef::new(&page).get_record(rid).is_some()
        };
        if !live {
            return Ok(false);
        }
        let mut page = guard.data_mut();
        Ok(PageMut::new(&mut page).update_record(rid, data))
    }

    /// Scan all live tuples, holding at most one pinned page at a time.
    pub fn iter(&self) -> TableIterator<'_> {
        TableIterator::new(self)
    }

    pub(super) fn bpm(&self) -> &BufferPoolManager {
        &self.bpm
    }
}
