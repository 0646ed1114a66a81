//! Pull-based operators: `init()` once, then `next()` until it yields
//! `None`.

mod error;
mod expression;
mod filter;
mod insert;
mod seq_scan;

pub use error::{ExecutionError, ExecutionResult};
pub use expression::CompiledExpr;
pub use filter::FilterExecutor;
pub use insert::InsertExecutor;
pub use seq_scan::SeqScanExecutor;

use crate::heap::Tuple;
use crate::storage::Rid;

pub trait Executor {
    fn init(&mut self) -> ExecutionResult<()>;

    /// Produce the next tuple, or `None` when exhausted.
    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>>;
}
