use chumsky::prelude::*;

use crate::catalog::{TypeId, Value};

use super::ast::{
    BinaryOp, CreateTableStatement, Expr, InsertStatement, SelectItem, SelectStatement, Statement,
};
use super::lexer::{Keyword as K, SqlToken as T};

type TokenInput<'a> = &'a [T<'a>];
type Err<'a> = extra::Err<Rich<'a, T<'a>>>;

fn kw<'a>(keyword: K) -> impl Parser<'a, TokenInput<'a>, (), Err<'a>> + Clone {
    just(T::Keyword(keyword)).ignored()
}

fn symbol<'a>(c: char) -> impl Parser<'a, TokenInput<'a>, (), Err<'a>> + Clone {
    just(T::Symbol(c)).ignored()
}

fn identifier<'a>() -> impl Parser<'a, TokenInput<'a>, String, Err<'a>> + Clone {
    select! { T::Ident(name) => name.to_string() }
}

fn literal<'a>() -> impl Parser<'a, TokenInput<'a>, Value, Err<'a>> + Clone {
    select! {
        T::Integer(i) => Value::Integer(i),
        T::Str(s) => Value::Varchar(s.to_string()),
    }
}

/// Expression grammar with precedence OR < AND < comparison < primary.
fn expr<'a>() -> impl Parser<'a, TokenInput<'a>, Expr, Err<'a>> + Clone {
    recursive(|expr| {
        let primary = choice((
            literal().map(Expr::Literal),
            identifier().map(Expr::Column),
            expr.delimited_by(symbol('('), symbol(')')),
        ))
        .boxed();

        let compare_op = select! { T::Op(op) => op };
        let comparison = primary
            .clone()
            .then(compare_op.then(primary).or_not())
            .map(|(left, rest)| match rest {
                None => left,
                Some((op, right)) => Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            })
            .boxed();

        let and_expr = comparison
            .clone()
            .foldl(
                kw(K::And).ignore_then(comparison).repeated(),
                |left, right| Expr::Binary {
                    op: BinaryOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            )
            .boxed();

        and_expr
            .clone()
            .foldl(kw(K::Or).ignore_then(and_expr).repeated(), |left, right| {
                Expr::Binary {
                    op: BinaryOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            })
    })
}

fn select_statement<'a>() -> impl Parser<'a, TokenInput<'a>, SelectStatement, Err<'a>> {
    let item = choice((
        symbol('*').to(SelectItem::Star),
        identifier().map(SelectItem::Column),
    ));

    kw(K::Select)
        .ignore_then(item.separated_by(symbol(',')).at_least(1).collect())
        .then(kw(K::From).ignore_then(identifier()))
        .then(kw(K::Where).ignore_then(expr()).or_not())
        .map(|((select_list, table), where_clause)| SelectStatement {
            select_list,
            table,
            where_clause,
        })
}

fn insert_statement<'a>() -> impl Parser<'a, TokenInput<'a>, InsertStatement, Err<'a>> {
    let column_list = identifier()
        .separated_by(symbol(','))
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(symbol('('), symbol(')'));

    let row = literal()
        .separated_by(symbol(','))
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(symbol('('), symbol(')'));

    kw(K::Insert)
        .ignore_then(kw(K::Into))
        .ignore_then(identifier())
        .then(column_list.or_not())
        .then_ignore(kw(K::Values))
        .then(row.separated_by(symbol(',')).at_least(1).collect())
        .map(|((table, columns), rows)| InsertStatement {
            table,
            columns: columns.unwrap_or_default(),
            rows,
        })
}

fn create_table_statement<'a>() -> impl Parser<'a, TokenInput<'a>, CreateTableStatement, Err<'a>> {
    let varchar_len = select! { T::Integer(n) if n > 0 => n as usize };
    let column_type = choice((
        kw(K::Integer).to(TypeId::Integer),
        kw(K::Varchar)
            .ignore_then(varchar_len.delimited_by(symbol('('), symbol(')')))
            .map(TypeId::Varchar),
    ));

    kw(K::Create)
        .ignore_then(kw(K::Table))
        .ignore_then(identifier())
        .then(
            identifier()
                .then(column_type)
                .separated_by(symbol(','))
                .at_least(1)
                .collect()
                .delimited_by(symbol('('), symbol(')')),
        )
        .map(|(table, columns)| CreateTableStatement { table, columns })
}

pub fn parser<'a>() -> impl Parser<'a, TokenInput<'a>, Vec<Statement>, Err<'a>> {
    choice((
        select_statement().map(Statement::Select),
        insert_statement().map(Statement::Insert),
        create_table_statement().map(Statement::CreateTable),
    ))
    .then_ignore(symbol(';'))
    .repeated()
    .collect()
}
