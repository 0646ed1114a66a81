use thiserror::Error;

use crate::storage::{PageId, StorageError};

/// Errors that can occur during index operations
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("corrupt index page {page_id}: {reason}")]
    Corrupt { page_id: PageId, reason: String },

    #[error("fanout {0} out of range (must be in 3..={1})")]
    InvalidFanout(u32, u32),
}

pub type IndexResult<T> = Result<T, IndexError>;
