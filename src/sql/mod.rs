//! SQL surface: lexer, statement parser, and the statement/expression
//! types the executors consume.

mod ast;
mod error;
mod lexer;
mod parser;

pub use ast::{
    BinaryOp, CreateTableStatement, Expr, InsertStatement, SelectItem, SelectStatement, Statement,
};
pub use error::{SqlError, SqlResult};
pub use lexer::{lexer, Keyword, SqlToken};
pub use parser::parser;

use chumsky::Parser;

/// Lex and parse a batch of `;`-terminated statements.
pub fn parse(input: &str) -> SqlResult<Vec<Statement>> {
    let tokens = match lexer().parse(input).into_result() {
        Ok(tokens) => tokens,
        Err(errs) => return Err(SqlError::Lex(format!("{errs:?}"))),
    };

    let tokens: Vec<SqlToken> = tokens
        .into_iter()
        .filter(|t| !matches!(t, SqlToken::Comment(_)))
        .collect();

    let result = parser()
        .parse(tokens.as_slice())
        .into_result()
        .map_err(|errs| SqlError::Parse(format!("{errs:?}")));
    result
}
