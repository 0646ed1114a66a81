use chumsky::{prelude::*, regex::regex, text::ascii::ident};

use super::ast::BinaryOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Select,
    From,
    Where,
    Insert,
    Into,
    Values,
    Create,
    Table,
    Integer,
    Varchar,
    And,
    Or,
}

impl Keyword {
    fn from_str(s: &str) -> Self {
        match s {
            "SELECT" => Keyword::Select,
            "FROM" => Keyword::From,
            "WHERE" => Keyword::Where,
            "INSERT" => Keyword::Insert,
            "INTO" => Keyword::Into,
            "VALUES" => Keyword::Values,
            "CREATE" => Keyword::Create,
            "TABLE" => Keyword::Table,
            "INTEGER" => Keyword::Integer,
            "VARCHAR" => Keyword::Varchar,
            "AND" => Keyword::And,
            "OR" => Keyword::Or,
            _ => unreachable!("keyword regex and Keyword variants out of sync"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlToken<'a> {
    Keyword(Keyword),
    Ident(&'a str),
    Integer(i32),
    Str(&'a str),
    Op(BinaryOp),
    Symbol(char),
    Comment(&'a str),
}

pub fn lexer<'a>() -> impl Parser<'a, &'a str, Vec<SqlToken<'a>>, extra::Err<Rich<'a, char>>> {
    let comment = just("--")
        .ignore_then(none_of("\n").repeated())
        .to_slice()
        .map(SqlToken::Comment)
        .padded();

    let integer = regex(r"-?\d+")
        .map(|s: &str| SqlToken::Integer(s.parse().unwrap()))
        .padded();

    let string = regex(r"'[^']*'")
        .map(|s: &str| SqlToken::Str(&s[1..s.len() - 1]))
        .padded();

    let keyword = {
        // Word boundaries keep keywords from matching identifier prefixes
        let pattern = r"\b(?:SELECT|FROM|WHERE|INSERT|INTO|VALUES|CREATE|TABLE|INTEGER|VARCHAR|AND|OR)\b";
        regex(pattern)
            .map(|s: &str| SqlToken::Keyword(Keyword::from_str(s)))
            .padded()
    };

    let identifier = ident().map(SqlToken::Ident).padded();

    let op = choice((
        just("<=").to(SqlToken::Op(BinaryOp::Le)),
        just(">=").to(SqlToken::Op(BinaryOp::Ge)),
        just("!=").to(SqlToken::Op(BinaryOp::Ne)),
        just("=").to(SqlToken::Op(BinaryOp::Eq)),
        just("<").to(SqlToken::Op(BinaryOp::Lt)),
        just(">").to(SqlToken::Op(BinaryOp::Gt)),
    ))
    .padded();

    let symbol = one_of("(),;*").map(SqlToken::Symbol).padded();

    choice((comment, string, integer, keyword, identifier, op, symbol))
        .repeated()
        .collect()
}
