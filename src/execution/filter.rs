use crate::catalog::{Schema, Value};
use crate::heap::Tuple;
use crate::storage::Rid;

use super::error::ExecutionResult;
use super::expression::CompiledExpr;
use super::Executor;

/// Yields only the child's tuples for which the predicate evaluates to a
/// non-zero integer.
pub struct FilterExecutor<'a> {
    child: Box<dyn Executor + 'a>,
    predicate: CompiledExpr,
    schema: &'a Schema,
}

impl<'a> FilterExecutor<'a> {
    pub fn new(child: Box<dyn Executor + 'a>, predicate: CompiledExpr, schema: &'a Schema) -> Self {
        Self {
            child,
            predicate,
            schema,
        }
    }
}

impl Executor for FilterExecutor<'_> {
    fn init(&mut self) -> ExecutionResult<()> {
        self.child.init()
    }

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>> {
        while let Some((tuple, rid)) = self.child.next()? {
            let keep = match self.predicate.evaluate(&tuple, self.schema)? {
                Value::Integer(0) => false,
                _ => true,
            };
            if keep {
                return Ok(Some((tuple, rid)));
            }
        }
        Ok(None)
    }
}
