use crate::catalog::{Schema, Value};
use crate::heap::{TableHeap, Tuple};
use crate::index::BPlusTree;
use crate::storage::Rid;

use super::error::ExecutionResult;
use super::Executor;

/// Serializes value rows through the schema into the heap, yielding each
/// inserted tuple. If the table has an index, every insert also posts the
/// key; a duplicate key keeps the first mapping.
pub struct InsertExecutor<'a> {
    heap: &'a mut TableHeap,
    index: Option<(&'a mut BPlusTree, usize)>,
    schema: &'a Schema,
    rows: Vec<Vec<Value>>,
    cursor: usize,
}

impl<'a> InsertExecutor<'a> {
    pub fn new(
        heap: &'a mut TableHeap,
        index: Option<(&'a mut BPlusTree, usize)>,
        schema: &'a Schema,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        Self {
            heap,
            index,
            schema,
            rows,
            cursor: 0,
        }
    }
}

impl Executor for InsertExecutor<'_> {
    fn init(&mut self) -> ExecutionResult<()> {
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>> {
        let Some(row) = self.rows.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;

        let bytes = self.schema.serialize_row(row)?;
        let rid = self.heap.insert_tuple(&bytes)?;

        if let Some((tree, key_column)) = self.index.as_mut() {
            if let Some(key) = row[*key_column].as_integer() {
                tree.insert(key, rid)?;
            }
        }

        Ok(Some((Tuple::with_rid(bytes, rid), rid)))
    }
}
