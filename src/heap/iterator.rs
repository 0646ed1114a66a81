use crate::storage::{PageGuard, PageRef, Rid};

use super::error::HeapResult;
use super::table::TableHeap;
use super::Tuple;

/// Walks every live tuple of a heap in page order, slot by slot, holding
/// at most one pinned page at a time. Pages are pinned read-only and
/// unpinned clean.
pub struct TableIterator<'a> {
    heap: &'a TableHeap,
    page_index: usize,
    slot: u32,
    guard: Option<PageGuard<'a>>,
}

impl<'a> TableIterator<'a> {
    pub(super) fn new(heap: &'a TableHeap) -> Self {
        Self {
            heap,
            page_index: 0,
            slot: 0,
            guard: None,
        }
    }

    /// Advance past tombstones to the next live tuple, or `None` when the
    /// heap is exhausted.
    pub fn next(&mut self) -> HeapResult<Option<(Tuple, Rid)>> {
        loop {
            if self.guard.is_none() {
                let Some(&page_id) = self.heap.pages().get(self.page_index) else {
                    return Ok(None);
                };
                self.guard = Some(self.heap.bpm().fetch_page(page_id)?);
            }

            let found = {
                let guard = self.guard.as_ref().unwrap();
                let data = guard.data();
                let view = PageRef::new(&data);
                let mut found = None;
                while self.slot < view.num_slots() {
                    let slot = self.slot;
                    self.slot += 1;
                    if let Some((offset, size, generation)) = view.slot(slot) {
                        if size > 0 {
                            let rid = Rid::new(view.page_id(), slot, generation);
                            let bytes = data[offset as usize..(offset + size) as usize].to_vec();
                            found = Some((Tuple::with_rid(bytes, rid), rid));
                            break;
                        }
                    }
                }
                found
            };

            match found {
                Some(item) => return Ok(Some(item)),
                None => {
                    self.guard = None;
                    self.page_index += 1;
                    self.slot = 0;
                }
            }
        }
    }
}
