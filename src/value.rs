use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage class a column is declared with in generated DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageClass {
    Text,
    Integer,
    Real,
    Numeric,
    Binary,
}

impl StorageClass {
    /// Keyword emitted in `CREATE TABLE`.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Numeric => "NUMERIC",
            Self::Binary => "BINARY",
        }
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Core value type exchanged with the store, both as statement arguments
/// and as ad hoc row cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Runtime storage class of the value, `None` for null.
    pub const fn storage_class(&self) -> Option<StorageClass> {
        match self {
            Self::Null => None,
            Self::Integer(_) => Some(StorageClass::Integer),
            Self::Real(_) => Some(StorageClass::Real),
            Self::Text(_) => Some(StorageClass::Text),
            Self::Blob(_) => Some(StorageClass::Binary),
        }
    }

    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(v) => Some(v),
            _ => None,
        }
    }
}

macro_rules! value_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Self::Integer(i64::from(value))
                }
            }
        )*
    };
}

value_from_integer!(i8, i16, i32, i64, u8, u16, u32, bool);

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Real(f64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Self::Blob(value.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Builds a positional argument list: `args![1_i64, "name", 2.5]`.
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($arg:expr),+ $(,)?) => {
        ::std::vec![$($crate::Value::from($arg)),+]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_macro_converts_each_argument() {
        let args = crate::args![1_i32, "a", 2.5_f64, Option::<i64>::None, true];
        assert_eq!(
            args,
            vec![
                Value::Integer(1),
                Value::Text("a".to_string()),
                Value::Real(2.5),
                Value::Null,
                Value::Integer(1),
            ]
        );
        assert!(crate::args![].is_empty());
    }

    #[test]
    fn storage_class_follows_variant() {
        assert_eq!(Value::Null.storage_class(), None);
        assert_eq!(
            Value::Blob(vec![1]).storage_class(),
            Some(StorageClass::Binary)
        );
        assert_eq!(StorageClass::Numeric.to_string(), "NUMERIC");
    }
}
