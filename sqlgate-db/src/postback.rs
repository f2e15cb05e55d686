//! Change-set reconciliation.
//!
//! Turns a client-computed diff of a table projection into a sequence of
//! parameterized INSERT, DELETE, and UPDATE statements against the base
//! table, all inside one transaction. Every statement must affect exactly
//! one row; anything else aborts the whole batch.
//!
//! Identifiers in generated SQL always come from catalog metadata, never
//! from client text. Values are always bound as parameters.

use crate::convert;
use crate::database::Database;
use crate::error::{DbError, ReconcileError, ReconcilePhase};
use crate::schema::{quote_ident, TableSchema};
use indexmap::IndexSet;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use sqlgate_protocol::{ChangeSet, PostbackData, Row};

pub(crate) fn apply(db: &mut Database, change: &ChangeSet) -> Result<PostbackData, DbError> {
    if change.updated_new.len() != change.updated_old.len() {
        return Err(DbError::MismatchedUpdate {
            new: change.updated_new.len(),
            old: change.updated_old.len(),
        });
    }

    let schema = TableSchema::load(db.conn(), &change.tablename)?
        .ok_or_else(|| DbError::UnknownTable(change.tablename.clone()))?;

    let used = used_columns(change);
    for &column in &used {
        if schema.get(column).is_none() {
            return Err(DbError::UnknownColumn {
                column: column.to_string(),
                table: schema.table().to_string(),
            });
        }
    }

    let idcolumn = schema.identity_column().map(|c| c.name.clone());
    // Insert column list: every used column the engine will accept a value
    // for, as (client spelling, catalog spelling). Values are looked up by
    // the client spelling; SQL is generated from the catalog spelling.
    let writable: Vec<(&str, &str)> = used
        .iter()
        .filter_map(|&key| {
            let meta = schema.get(key)?;
            (!meta.is_identity && !meta.read_only).then_some((key, meta.name.as_str()))
        })
        .collect();

    db.begin()?;
    let identities = match run_changes(db, change, &schema, &writable, idcolumn.is_some()) {
        Ok(identities) => identities,
        Err(err) => {
            if let Err(rollback_err) = db.rollback() {
                tracing::warn!(error = %rollback_err, "rollback after failed postback also failed");
            }
            return Err(err);
        }
    };
    if let Err(err) = db.commit() {
        if let Err(rollback_err) = db.rollback() {
            tracing::warn!(error = %rollback_err, "rollback after failed commit also failed");
        }
        return Err(err);
    }

    tracing::debug!(
        table = schema.table(),
        inserted = change.inserted.len(),
        deleted = change.deleted.len(),
        updated = change.updated_new.len(),
        "postback committed"
    );
    Ok(PostbackData {
        idcolumn,
        identities,
    })
}

/// Column names in use, taken from the first row of each change list.
/// Row shapes are assumed homogeneous within a list and are not
/// re-validated per row.
fn used_columns(change: &ChangeSet) -> IndexSet<&str> {
    [
        change.inserted.first(),
        change.deleted.first(),
        change.updated_old.first(),
    ]
    .into_iter()
    .flatten()
    .flat_map(Row::columns)
    .collect()
}

fn run_changes(
    db: &Database,
    change: &ChangeSet,
    schema: &TableSchema,
    writable: &[(&str, &str)],
    capture_identities: bool,
) -> Result<Vec<i64>, DbError> {
    let conn = db.conn();
    let table = quote_ident(schema.table());

    let mut identities = Vec::new();
    if !change.inserted.is_empty() {
        let sql = if writable.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES")
        } else {
            let columns: Vec<String> = writable
                .iter()
                .map(|(_, canonical)| quote_ident(canonical))
                .collect();
            let marks = vec!["?"; writable.len()].join(", ");
            format!(
                "INSERT INTO {table} ({}) VALUES ({marks})",
                columns.join(", ")
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        for (index, row) in change.inserted.iter().enumerate() {
            let params: Vec<Value> = writable
                .iter()
                .map(|&(key, _)| {
                    row.get(key)
                        .map(convert::to_sql)
                        .ok_or_else(|| DbError::MissingInsertValue {
                            index,
                            column: key.to_string(),
                        })
                })
                .collect::<Result<_, _>>()?;
            let affected = stmt.execute(params_from_iter(params))?;
            if affected != 1 {
                return Err(ReconcileError {
                    phase: ReconcilePhase::Insert,
                    index,
                    affected,
                }
                .into());
            }
            if capture_identities {
                identities.push(conn.last_insert_rowid());
            }
        }
    }

    for (index, row) in change.deleted.iter().enumerate() {
        let (clause, params) = predicate(schema, row)?;
        let sql = format!("DELETE FROM {table} WHERE {clause}");
        let affected = conn.execute(&sql, params_from_iter(params))?;
        if affected != 1 {
            return Err(ReconcileError {
                phase: ReconcilePhase::Delete,
                index,
                affected,
            }
            .into());
        }
    }

    for (index, (new, old)) in change
        .updated_new
        .iter()
        .zip(&change.updated_old)
        .enumerate()
    {
        let (assign, mut params) = assignments(schema, new)?;
        let (clause, where_params) = predicate(schema, old)?;
        params.extend(where_params);
        let sql = format!("UPDATE {table} SET {assign} WHERE {clause}");
        let affected = conn.execute(&sql, params_from_iter(params))?;
        if affected != 1 {
            return Err(ReconcileError {
                phase: ReconcilePhase::Update,
                index,
                affected,
            }
            .into());
        }
    }

    Ok(identities)
}

/// WHERE clause matching a row's last-known values. A null snapshot value
/// compares with IS NULL; everything else binds a parameter.
fn predicate(schema: &TableSchema, row: &Row) -> Result<(String, Vec<Value>), DbError> {
    if row.is_empty() {
        return Err(DbError::EmptyChangeRow);
    }
    let mut clauses = Vec::with_capacity(row.len());
    let mut params = Vec::new();
    for (column, value) in row.iter() {
        let ident = resolve_ident(schema, column)?;
        if value.is_null() {
            clauses.push(format!("{ident} IS NULL"));
        } else {
            clauses.push(format!("{ident} = ?"));
            params.push(convert::to_sql(value));
        }
    }
    Ok((clauses.join(" AND "), params))
}

/// SET list from a new row's values. Nulls are bound as parameters here,
/// unlike in the predicate.
fn assignments(schema: &TableSchema, row: &Row) -> Result<(String, Vec<Value>), DbError> {
    if row.is_empty() {
        return Err(DbError::EmptyChangeRow);
    }
    let mut sets = Vec::with_capacity(row.len());
    let mut params = Vec::with_capacity(row.len());
    for (column, value) in row.iter() {
        let ident = resolve_ident(schema, column)?;
        sets.push(format!("{ident} = ?"));
        params.push(convert::to_sql(value));
    }
    Ok((sets.join(", "), params))
}

fn resolve_ident(schema: &TableSchema, column: &str) -> Result<String, DbError> {
    let meta = schema.get(column).ok_or_else(|| DbError::UnknownColumn {
        column: column.to_string(),
        table: schema.table().to_string(),
    })?;
    Ok(quote_ident(&meta.name))
}
