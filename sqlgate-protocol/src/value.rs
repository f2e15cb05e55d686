//! Database values and ordered rows.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

/// A single database value as it travels on the wire.
///
/// Serialized untagged: JSON null, boolean, number or string map directly;
/// blobs are JSON arrays of byte values. Variant order matters for
/// deserialization (integers must be tried before floats).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(ByteBuf),
}

impl SqlValue {
    /// Logical type name used in result column maps.
    pub fn logical_type(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "string",
            SqlValue::Bytes(_) => "bytes",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Creates a blob value.
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        SqlValue::Bytes(ByteBuf::from(data.into()))
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(ByteBuf::from(v))
    }
}

/// One result or change-set row: an ordered mapping of column name to value.
///
/// Insertion order is preserved; it is the only column ordering a client
/// without separate schema information ever sees.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(IndexMap<String, SqlValue>);

impl Row {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Inserts a value, replacing any existing value for the column and
    /// keeping the column's original position.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.0.get(column)
    }

    /// Column names in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, SqlValue)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, SqlValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
