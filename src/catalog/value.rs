use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{CatalogError, CatalogResult};

/// Column type. VARCHAR is fixed-width on disk: values are zero-padded to
/// the declared length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeId {
    Integer,
    Varchar(usize),
}

impl TypeId {
    /// On-disk width in bytes.
    pub fn size(&self) -> usize {
        match self {
            TypeId::Integer => 4,
            TypeId::Varchar(len) => *len,
        }
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeId::Integer => write!(f, "INTEGER"),
            TypeId::Varchar(len) => write!(f, "VARCHAR({len})"),
        }
    }
}

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i32),
    Varchar(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Varchar(_) => "VARCHAR",
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Varchar(_) => None,
        }
    }

    /// Serialize into `buf`, which must be exactly `type_id.size()` bytes.
    pub fn serialize_into(&self, type_id: TypeId, buf: &mut [u8]) -> CatalogResult<()> {
        debug_assert_eq!(buf.len(), type_id.size());
        match (self, type_id) {
            (Value::Integer(i), TypeId::Integer) => {
                buf.copy_from_slice(&i.to_le_bytes());
                Ok(())
            }
            (Value::Varchar(s), TypeId::Varchar(len)) => {
                let bytes = s.as_bytes();
                if bytes.len() > len {
                    return Err(CatalogError::ValueTooLarge(format!(
                        "'{s}' exceeds VARCHAR({len})"
                    )));
                }
                buf[..bytes.len()].copy_from_slice(bytes);
                buf[bytes.len()..].fill(0);
                Ok(())
            }
            (value, type_id) => Err(CatalogError::TypeMismatch {
                expected: type_id.to_string(),
                actual: value.type_name().to_string(),
            }),
        }
    }

    /// Deserialize a value of `type_id` from `buf`.
    pub fn deserialize_from(type_id: TypeId, buf: &[u8]) -> CatalogResult<Self> {
        debug_assert_eq!(buf.len(), type_id.size());
        match type_id {
            TypeId::Integer => Ok(Value::Integer(i32::from_le_bytes(
                buf.try_into().map_err(|_| {
                    CatalogError::Deserialization("INTEGER needs 4 bytes".into())
                })?,
            ))),
            TypeId::Varchar(_) => {
                let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
                let s = std::str::from_utf8(&buf[..end])
                    .map_err(|e| CatalogError::Deserialization(format!("invalid UTF-8: {e}")))?;
                Ok(Value::Varchar(s.to_string()))
            }
        }
    }
}

impl PartialOrd for Value {
    /// Values of different types are incomparable.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Varchar(a), Value::Varchar(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{i}"),
            Value::Varchar(s) => write!(f, "{s}"),
        }
    }
}
