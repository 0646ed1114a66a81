use thiserror::Error;

use crate::catalog::CatalogError;
use crate::heap::HeapError;
use crate::index::IndexError;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("heap error: {0}")]
    Heap(#[from] HeapError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("column {0} not found")]
    ColumnNotFound(String),

    #[error("cannot compare {left} with {right}")]
    IncomparableTypes { left: String, right: String },

    #[error("{op} needs integer operands")]
    NonBooleanOperand { op: &'static str },
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;
