use std::cmp::Ordering;

use crate::catalog::{Schema, Value};
use crate::heap::Tuple;
use crate::sql::{BinaryOp, Expr};

use super::error::{ExecutionError, ExecutionResult};

/// Expression tree with column references resolved to indexes, evaluated
/// against serialized tuples. Comparisons yield `Integer(0)` or
/// `Integer(1)`; AND/OR combine those integers without short-circuiting.
#[derive(Debug, Clone)]
pub enum CompiledExpr {
    Column(usize),
    Literal(Value),
    Binary {
        op: BinaryOp,
        left: Box<CompiledExpr>,
        right: Box<CompiledExpr>,
    },
}

impl CompiledExpr {
    /// Resolve column names against `schema`.
    pub fn bind(expr: &Expr, schema: &Schema) -> ExecutionResult<Self> {
        match expr {
            Expr::Column(name) => schema
                .column_index(name)
                .map(CompiledExpr::Column)
                .ok_or_else(|| ExecutionError::ColumnNotFound(name.clone())),
            Expr::Literal(value) => Ok(CompiledExpr::Literal(value.clone())),
            Expr::Binary { op, left, right } => Ok(CompiledExpr::Binary {
                op: *op,
                left: Box::new(Self::bind(left, schema)?),
                right: Box::new(Self::bind(right, schema)?),
            }),
        }
    }

    pub fn evaluate(&self, tuple: &Tuple, schema: &Schema) -> ExecutionResult<Value> {
        match self {
            CompiledExpr::Column(index) => Ok(schema.value_at(tuple.data(), *index)?),
            CompiledExpr::Literal(value) => Ok(value.clone()),
            CompiledExpr::Binary { op, left, right } => {
                let left = left.evaluate(tuple, schema)?;
                let right = right.evaluate(tuple, schema)?;
                match op {
                    BinaryOp::And | BinaryOp::Or => {
                        let kind = if *op == BinaryOp::And { "AND" } else { "OR" };
                        let l = left
                            .as_integer()
                            .ok_or(ExecutionError::NonBooleanOperand { op: kind })?;
                        let r = right
                            .as_integer()
                            .ok_or(ExecutionError::NonBooleanOperand { op: kind })?;
                        let result = if *op == BinaryOp::And {
                            l != 0 && r != 0
                        } else {
                            l != 0 || r != 0
                        };
                        Ok(Value::Integer(result as i32))
                    }
                    _ => {
                        let ordering = left.partial_cmp(&right).ok_or_else(|| {
                            ExecutionError::IncomparableTypes {
                                left: left.type_name().to_string(),
                                right: right.type_name().to_string(),
                            }
                        })?;
                        let result = match op {
                            BinaryOp::Eq => ordering == Ordering::Equal,
                            BinaryOp::Ne => ordering != Ordering::Equal,
                            BinaryOp::Lt => ordering == Ordering::Less,
                            BinaryOp::Gt => ordering == Ordering::Greater,
                            BinaryOp::Le => ordering != Ordering::Greater,
                            BinaryOp::Ge => ordering != Ordering::Less,
                            BinaryOp::And | BinaryOp::Or => unreachable!(),
                        };
                        Ok(Value::Integer(result as i32))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, TypeId};

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("id", TypeId::Integer),
            Column::new("name", TypeId::Varchar(8)),
        ])
    }

    fn tuple(schema: &Schema, id: i32, name: &str) -> Tuple {
        let row = schema
            .serialize_row(&[Value::Integer(id), Value::Varchar(name.into())])
            .unwrap();
        Tuple::new(row)
    }

    fn eval(expr: &Expr, schema: &Schema, tuple: &Tuple) -> Value {
        CompiledExpr::bind(expr, schema)
            .unwrap()
            .evaluate(tuple, schema)
            .unwrap()
    }

    fn cmp(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[test]
    fn test_column_and_literal() {
        let schema = schema();
        let t = tuple(&schema, 5, "eve");
        assert_eq!(eval(&Expr::Column("id".into()), &schema, &t), Value::Integer(5));
        assert_eq!(
            eval(&Expr::Column("name".into()), &schema, &t),
            Value::Varchar("eve".into())
        );
    }

    #[test]
    fn test_comparisons() {
        let schema = schema();
        let t = tuple(&schema, 5, "eve");
        let id = || Expr::Column("id".into());
        let five = || Expr::Literal(Value::Integer(5));
        let six = || Expr::Literal(Value::Integer(6));

        assert_eq!(eval(&cmp(BinaryOp::Eq, id(), five()), &schema, &t), Value::Integer(1));
        assert_eq!(eval(&cmp(BinaryOp::Ne, id(), five()), &schema, &t), Value::Integer(0));
        assert_eq!(eval(&cmp(BinaryOp::Lt, id(), six()), &schema, &t), Value::Integer(1));
        assert_eq!(eval(&cmp(BinaryOp::Ge, id(), six()), &schema, &t), Value::Integer(0));
    }

    #[test]
    fn test_and_or() {
        let schema = schema();
        let t = tuple(&schema, 5, "eve");
        let id_is_5 = cmp(
            BinaryOp::Eq,
            Expr::Column("id".into()),
            Expr::Literal(Value::Integer(5)),
        );
        let name_is_bob = cmp(
            BinaryOp::Eq,
            Expr::Column("name".into()),
            Expr::Literal(Value::Varchar("bob".into())),
        );

        let and = cmp(BinaryOp::And, id_is_5.clone(), name_is_bob.clone());
        assert_eq!(eval(&and, &schema, &t), Value::Integer(0));
        let or = cmp(BinaryOp::Or, id_is_5, name_is_bob);
        assert_eq!(eval(&or, &schema, &t), Value::Integer(1));
    }

    #[test]
    fn test_unknown_column() {
        let schema = schema();
        assert!(matches!(
            CompiledExpr::bind(&Expr::Column("ghost".into()), &schema),
            Err(ExecutionError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_incomparable_types() {
        let schema = schema();
        let t = tuple(&schema, 5, "eve");
        let mixed = cmp(
            BinaryOp::Eq,
            Expr::Column("id".into()),
            Expr::Literal(Value::Varchar("5".into())),
        );
        let compiled = CompiledExpr::bind(&mixed, &schema).unwrap();
        assert!(matches!(
            compiled.evaluate(&t, &schema),
            Err(ExecutionError::IncomparableTypes { .. })
        ));
    }
}
