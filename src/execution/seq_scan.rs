use crate::heap::{TableHeap, TableIterator, Tuple};
use crate::storage::Rid;

use super::error::ExecutionResult;
use super::Executor;

/// Full-table scan in heap order, one pinned page at a time.
pub struct SeqScanExecutor<'a> {
    heap: &'a TableHeap,
    iter: Option<TableIterator<'a>>,
}

impl<'a> SeqScanExecutor<'a> {
    pub fn new(heap: &'a TableHeap) -> Self {
        Self { heap, iter: None }
    }
}

impl Executor for SeqScanExecutor<'_> {
    fn init(&mut self) -> ExecutionResult<()> {
        self.iter = Some(self.heap.iter());
        Ok(())
    }

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>> {
        match self.iter.as_mut() {
            Some(iter) => Ok(iter.next()?),
            None => Ok(None),
        }
    }
}
