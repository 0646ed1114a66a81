use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("lex errors: {0}")]
    Lex(String),

    #[error("parse errors: {0}")]
    Parse(String),
}

pub type SqlResult<T> = Result<T, SqlError>;
