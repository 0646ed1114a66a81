use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum HeapError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("tuple of {0} bytes cannot fit in a page")]
    TupleTooLarge(usize),
}

pub type HeapResult<T> = Result<T, HeapError>;
