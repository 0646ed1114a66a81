use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("table {0} already exists")]
    TableExists(String),

    #[error("table {0} not found")]
    TableNotFound(String),

    #[error("column {0} not found")]
    ColumnNotFound(String),

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("value does not fit column: {0}")]
    ValueTooLarge(String),

    #[error("expected {expected} values, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("deserialization error: {0}")]
    Deserialization(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;
