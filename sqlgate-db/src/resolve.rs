//! Detects queries whose results map onto a single base table.
//!
//! The `table` command attaches full column schema to a result, which is
//! only well-defined when the query reads from exactly one table with no
//! joins. Anything else (joins, compound queries, expressions over multiple
//! relations, or SQL the parser does not understand) degrades to
//! value-derived column metadata with no owning table.

use sqlparser::ast::{SetExpr, Statement, TableFactor};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

/// Returns the table name referenced by `sql` when it is a single-table
/// `SELECT` with no joins, as written in the query (not yet resolved
/// against the catalog).
pub(crate) fn single_table_target(sql: &str) -> Option<String> {
    let statements = Parser::parse_sql(&SQLiteDialect {}, sql).ok()?;

    let query = match statements.as_slice() {
        [Statement::Query(query)] => query,
        _ => return None,
    };

    let select = match query.body.as_ref() {
        SetExpr::Select(select) => select,
        _ => return None,
    };

    let from = match select.from.as_slice() {
        [from] => from,
        _ => return None,
    };
    if !from.joins.is_empty() {
        return None;
    }

    match &from.relation {
        TableFactor::Table { name, .. } => match name.0.as_slice() {
            [ident] => Some(ident.value.clone()),
            _ => None,
        },
        _ => None,
    }
}
