use std::io;
use thiserror::Error;

use super::PageId;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("page {page_id} out of range (file holds {num_pages} pages)")]
    PageOutOfRange { page_id: PageId, num_pages: PageId },

    #[error("invalid page id: {0}")]
    InvalidPageId(PageId),

    #[error("no available frame: all {0} frames are pinned")]
    NoAvailableFrame(usize),

    #[error("page buffer must be {expected} bytes, got {actual}")]
    InvalidBufferSize { expected: usize, actual: usize },
}

pub type StorageResult<T> = Result<T, StorageError>;
