//! Conversions between wire values and SQLite values.

use rusqlite::types::Value;
use serde_bytes::ByteBuf;
use sqlgate_protocol::SqlValue;

/// Converts a wire value into a bindable SQLite value.
///
/// Booleans become integers, matching how SQLite stores them; a client
/// snapshot of `true` then compares equal to the stored `1` in postback
/// predicates.
pub(crate) fn to_sql(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Integer(i64::from(*b)),
        SqlValue::Int(i) => Value::Integer(*i),
        SqlValue::Float(f) => Value::Real(*f),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Bytes(b) => Value::Blob(b.to_vec()),
    }
}

/// Converts a SQLite value read from a result row into a wire value.
pub(crate) fn from_sql(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Int(i),
        Value::Real(f) => SqlValue::Float(f),
        Value::Text(s) => SqlValue::Text(s),
        Value::Blob(b) => SqlValue::Bytes(ByteBuf::from(b)),
    }
}

/// Maps a declared column type to a logical type name, following SQLite's
/// affinity rules, with extra cases for boolean and date/time declarations
/// (both stored as text or integers but more useful to clients under their
/// declared intent).
pub(crate) fn logical_type_from_decl(decl: &str) -> &'static str {
    let upper = decl.trim().to_ascii_uppercase();
    if upper.contains("INT") {
        "int"
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        "string"
    } else if upper.is_empty() || upper.contains("BLOB") {
        "bytes"
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        "float"
    } else if upper.contains("BOOL") {
        "bool"
    } else if upper.contains("DATE") || upper.contains("TIME") {
        "string"
    } else {
        // NUMERIC affinity (decimal, numeric, ...).
        "float"
    }
}

/// Extracts the declared size from a type like `VARCHAR(30)` or
/// `DECIMAL(10,2)` (the first number in the parenthesized suffix).
pub(crate) fn declared_size(decl: &str) -> Option<u32> {
    let start = decl.find('(')? + 1;
    let rest = &decl[start..];
    let end = rest.find([',', ')'])?;
    rest[..end].trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_roundtrip() {
        let values = vec![
            SqlValue::Null,
            SqlValue::Int(-42),
            SqlValue::Float(2.5),
            SqlValue::Text("hi".to_string()),
            SqlValue::bytes(vec![1, 2, 3]),
        ];
        for value in values {
            assert_eq!(from_sql(to_sql(&value)), value);
        }
    }

    #[test]
    fn test_bool_binds_as_integer() {
        assert_eq!(to_sql(&SqlValue::Bool(true)), Value::Integer(1));
        assert_eq!(to_sql(&SqlValue::Bool(false)), Value::Integer(0));
    }

    #[test]
    fn test_logical_type_from_decl() {
        assert_eq!(logical_type_from_decl("INTEGER"), "int");
        assert_eq!(logical_type_from_decl("bigint"), "int");
        assert_eq!(logical_type_from_decl("VARCHAR(30)"), "string");
        assert_eq!(logical_type_from_decl("TEXT"), "string");
        assert_eq!(logical_type_from_decl("BLOB"), "bytes");
        assert_eq!(logical_type_from_decl(""), "bytes");
        assert_eq!(logical_type_from_decl("DOUBLE PRECISION"), "float");
        assert_eq!(logical_type_from_decl("REAL"), "float");
        assert_eq!(logical_type_from_decl("BOOLEAN"), "bool");
        assert_eq!(logical_type_from_decl("DATETIME"), "string");
        assert_eq!(logical_type_from_decl("DECIMAL(10,2)"), "float");
    }

    #[test]
    fn test_declared_size() {
        assert_eq!(declared_size("VARCHAR(30)"), Some(30));
        assert_eq!(declared_size("DECIMAL(10,2)"), Some(10));
        assert_eq!(declared_size("CHAR( 8 )"), Some(8));
        assert_eq!(declared_size("INTEGER"), None);
        assert_eq!(declared_size("TEXT()"), None);
    }
}
