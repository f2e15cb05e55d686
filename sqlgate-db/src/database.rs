//! Session-scoped database gateway.

use crate::convert;
use crate::error::DbError;
use crate::postback;
use crate::resolve;
use crate::schema::{self, TableSchema};
use indexmap::IndexMap;
use rusqlite::types::Value;
use rusqlite::Connection;
use sqlgate_protocol::{ChangeSet, ColumnMeta, PostbackData, QueryData, Row, TableData};
use std::time::Duration;

/// One open database handle, owned by exactly one session.
///
/// All calls run synchronously on the caller; lock waits are bounded by the
/// busy timeout given at open and surface as errors.
pub struct Database {
    conn: Connection,
    target: String,
    in_transaction: bool,
}

/// Rows plus the column metadata available before and after execution.
struct RawResult {
    names: Vec<String>,
    decl_types: Vec<Option<String>>,
    rows: Vec<Row>,
    /// Logical type per column, captured from the first row only. Empty
    /// when the result has no rows.
    first_row_types: IndexMap<String, String>,
}

impl Database {
    /// Opens a database. The target is a filesystem path or
    /// [`MEMORY_TARGET`](crate::MEMORY_TARGET).
    pub fn open(target: &str, busy_timeout: Duration) -> Result<Self, DbError> {
        let conn = Connection::open(target)?;
        conn.busy_timeout(busy_timeout)?;
        Ok(Self {
            conn,
            target: target.to_string(),
            in_transaction: false,
        })
    }

    /// The target string this database was opened with.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Runs a query and returns all rows.
    pub fn query(&self, sql: &str) -> Result<QueryData, DbError> {
        let raw = self.run_query(sql, None)?;
        Ok(QueryData {
            rows: raw.rows,
            columns: raw.first_row_types,
        })
    }

    /// Runs a query and returns at most the first row.
    pub fn query_single(&self, sql: &str) -> Result<QueryData, DbError> {
        let raw = self.run_query(sql, Some(1))?;
        Ok(QueryData {
            rows: raw.rows,
            columns: raw.first_row_types,
        })
    }

    /// Runs a query and returns the first column of the first row as a
    /// single-row result labeled `value`. No rows yields a null value.
    pub fn query_value(&self, sql: &str) -> Result<QueryData, DbError> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let value = match rows.next()? {
            Some(row) => convert::from_sql(row.get::<_, Value>(0)?),
            None => sqlgate_protocol::SqlValue::Null,
        };

        let mut columns = IndexMap::new();
        columns.insert("value".to_string(), value.logical_type().to_string());
        let mut row = Row::new();
        row.insert("value", value);

        Ok(QueryData {
            rows: vec![row],
            columns,
        })
    }

    /// Executes a mutating statement and returns the affected row count as
    /// a single-row result labeled `rowsAffected`.
    pub fn execute(&self, sql: &str) -> Result<QueryData, DbError> {
        let affected = self.conn.execute(sql, [])?;

        let mut columns = IndexMap::new();
        columns.insert("rowsAffected".to_string(), "int".to_string());
        let mut row = Row::new();
        row.insert("rowsAffected", affected as i64);

        Ok(QueryData {
            rows: vec![row],
            columns,
        })
    }

    /// Runs a query and attaches full column schema.
    ///
    /// When the query reads from a single base table, columns are matched
    /// by name against that table's catalog metadata; anything unmatched is
    /// a read-only expression column. `tablename` is set when the writable
    /// result columns all belong to one table.
    pub fn query_table(&self, sql: &str) -> Result<TableData, DbError> {
        let raw = self.run_query(sql, None)?;

        let table_schema = match resolve::single_table_target(sql) {
            Some(target) => TableSchema::load(&self.conn, &target)?,
            None => None,
        };

        let columns: Vec<ColumnMeta> = raw
            .names
            .iter()
            .zip(&raw.decl_types)
            .map(|(name, decl)| {
                if let Some(meta) = table_schema.as_ref().and_then(|s| s.get(name)) {
                    // Keep the name as the query produced it so the schema
                    // entry lines up with the row keys.
                    let mut meta = meta.clone();
                    meta.name = name.clone();
                    return meta;
                }
                let logical_type = match decl.as_deref() {
                    Some(decl) => convert::logical_type_from_decl(decl).to_string(),
                    None => raw
                        .first_row_types
                        .get(name)
                        .cloned()
                        .unwrap_or_else(|| "null".to_string()),
                };
                ColumnMeta {
                    name: name.clone(),
                    logical_type,
                    nullable: true,
                    is_identity: false,
                    is_key: false,
                    read_only: true,
                    size: decl.as_deref().and_then(convert::declared_size),
                    owning_table: None,
                }
            })
            .collect();

        let tablename = schema::common_table(&columns);

        Ok(TableData {
            rows: raw.rows,
            tablename,
            columns,
        })
    }

    /// Applies a change-set in one transaction. See [`crate::postback`]
    /// semantics on [`ChangeSet`].
    pub fn postback(&mut self, change: &ChangeSet) -> Result<PostbackData, DbError> {
        postback::apply(self, change)
    }

    /// Opens an immediate transaction.
    pub fn begin(&mut self) -> Result<(), DbError> {
        if self.in_transaction {
            return Err(DbError::TransactionOpen);
        }
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        self.in_transaction = true;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<(), DbError> {
        if !self.in_transaction {
            return Err(DbError::NoTransaction);
        }
        self.conn.execute_batch("COMMIT")?;
        self.in_transaction = false;
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<(), DbError> {
        if !self.in_transaction {
            return Err(DbError::NoTransaction);
        }
        self.conn.execute_batch("ROLLBACK")?;
        self.in_transaction = false;
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Closes the handle, rolling back any open transaction first.
    pub fn close(mut self) -> Result<(), DbError> {
        if self.in_transaction {
            if let Err(err) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %err, "rollback during close failed");
            }
            self.in_transaction = false;
        }
        self.conn.close().map_err(|(_, err)| DbError::Sqlite(err))
    }

    fn run_query(&self, sql: &str, limit: Option<usize>) -> Result<RawResult, DbError> {
        let mut stmt = self.conn.prepare(sql)?;
        let (names, decl_types): (Vec<String>, Vec<Option<String>>) = stmt
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), c.decl_type().map(str::to_string)))
            .unzip();

        let mut out_rows = Vec::new();
        let mut first_row_types = IndexMap::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut out = Row::new();
            for (i, name) in names.iter().enumerate() {
                let value = convert::from_sql(row.get::<_, Value>(i)?);
                if out_rows.is_empty() {
                    first_row_types.insert(name.clone(), value.logical_type().to_string());
                }
                out.insert(name.clone(), value);
            }
            out_rows.push(out);
            if limit.is_some_and(|limit| out_rows.len() >= limit) {
                break;
            }
        }

        Ok(RawResult {
            names,
            decl_types,
            rows: out_rows,
            first_row_types,
        })
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("target", &self.target)
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}
