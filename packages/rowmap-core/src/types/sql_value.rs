use std::fmt;

use serde::{Deserialize, Serialize};

/// Native column types understood by executors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Text,
    Blob,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::TinyInt => "TINYINT",
            ColumnType::SmallInt => "SMALLINT",
            ColumnType::Integer => "INTEGER",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Real => "REAL",
            ColumnType::Double => "DOUBLE",
            ColumnType::Text => "TEXT",
            ColumnType::Blob => "BLOB",
        };
        f.write_str(name)
    }
}

/// A bound argument or fetched column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Column type of a non-null value.
    pub fn column_type(&self) -> Option<ColumnType> {
        Some(match self {
            SqlValue::Null => return None,
            SqlValue::Boolean(_) => ColumnType::Boolean,
            SqlValue::TinyInt(_) => ColumnType::TinyInt,
            SqlValue::SmallInt(_) => ColumnType::SmallInt,
            SqlValue::Integer(_) => ColumnType::Integer,
            SqlValue::BigInt(_) => ColumnType::BigInt,
            SqlValue::Real(_) => ColumnType::Real,
            SqlValue::Double(_) => ColumnType::Double,
            SqlValue::Text(_) => ColumnType::Text,
            SqlValue::Blob(_) => ColumnType::Blob,
        })
    }

    /// Appends a tagged, length-prefixed encoding of the value.
    ///
    /// Distinct values always produce distinct byte strings, and a sequence
    /// of encodings can be split back unambiguously.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            SqlValue::Null => out.push(0),
            SqlValue::Boolean(v) => out.extend_from_slice(&[1, *v as u8]),
            SqlValue::TinyInt(v) => {
                out.push(2);
                out.extend_from_slice(&v.to_be_bytes());
            }
            SqlValue::SmallInt(v) => {
                out.push(3);
                out.extend_from_slice(&v.to_be_bytes());
            }
            SqlValue::Integer(v) => {
                out.push(4);
                out.extend_from_slice(&v.to_be_bytes());
            }
            SqlValue::BigInt(v) => {
                out.push(5);
                out.extend_from_slice(&v.to_be_bytes());
            }
            SqlValue::Real(v) => {
                out.push(6);
                out.extend_from_slice(&v.to_bits().to_be_bytes());
            }
            SqlValue::Double(v) => {
                out.push(7);
                out.extend_from_slice(&v.to_bits().to_be_bytes());
            }
            SqlValue::Text(v) => {
                out.push(8);
                out.extend_from_slice(&(v.len() as u64).to_be_bytes());
                out.extend_from_slice(v.as_bytes());
            }
            SqlValue::Blob(v) => {
                out.push(9);
                out.extend_from_slice(&(v.len() as u64).to_be_bytes());
                out.extend_from_slice(v);
            }
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Boolean(v) => write!(f, "{}", v),
            SqlValue::TinyInt(v) => write!(f, "{}", v),
            SqlValue::SmallInt(v) => write!(f, "{}", v),
            SqlValue::Integer(v) => write!(f, "{}", v),
            SqlValue::BigInt(v) => write!(f, "{}", v),
            SqlValue::Real(v) => write!(f, "{}", v),
            SqlValue::Double(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "'{}'", v),
            SqlValue::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntest::timeout;

    fn encoded(values: &[SqlValue]) -> Vec<u8> {
        let mut out = Vec::new();
        for value in values {
            value.encode_into(&mut out);
        }
        out
    }

    #[timeout(1000)]
    #[test]
    fn test_encoding_separates_values() {
        assert_ne!(
            encoded(&[SqlValue::Text("ab".into()), SqlValue::Text("c".into())]),
            encoded(&[SqlValue::Text("a".into()), SqlValue::Text("bc".into())])
        );
        assert_ne!(
            encoded(&[SqlValue::Integer(1)]),
            encoded(&[SqlValue::BigInt(1)])
        );
        assert_ne!(encoded(&[SqlValue::Null]), encoded(&[SqlValue::Boolean(false)]));
        assert_eq!(
            encoded(&[SqlValue::BigInt(258)]),
            vec![5, 0, 0, 0, 0, 0, 0, 1, 2]
        );
    }
}
