//! Table schema introspection.
//!
//! Column metadata comes from `pragma_table_xinfo`; the catalog lookup that
//! resolves a client-supplied table name to its canonical spelling comes
//! from `pragma_table_list`. Generated SQL only ever interpolates
//! identifiers that came out of these catalog queries, quoted.

use crate::convert;
use crate::error::DbError;
use rusqlite::Connection;
use sqlgate_protocol::ColumnMeta;

/// Quotes an identifier for safe interpolation into SQL text.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Column metadata for one base table, in declaration order.
#[derive(Debug, Clone)]
pub struct TableSchema {
    table: String,
    columns: Vec<ColumnMeta>,
}

impl TableSchema {
    /// Loads the schema for `table`, resolving the name case-insensitively
    /// against the catalog. Returns `Ok(None)` when no such base table
    /// exists.
    pub fn load(conn: &Connection, table: &str) -> Result<Option<Self>, DbError> {
        let Some((canonical, without_rowid)) = lookup_table(conn, table)? else {
            return Ok(None);
        };

        // (name, declared type, notnull, pk ordinal, hidden kind)
        let mut raw: Vec<(String, String, i64, i64, i64)> = Vec::new();
        {
            let mut stmt = conn.prepare(
                "SELECT name, \"type\", \"notnull\", pk, hidden FROM pragma_table_xinfo(?1)",
            )?;
            let mut rows = stmt.query([&canonical])?;
            while let Some(row) = rows.next()? {
                raw.push((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ));
            }
        }

        // The identity column is the rowid alias: the single primary key
        // column of a rowid table, declared exactly INTEGER.
        let pk_columns = raw.iter().filter(|c| c.3 > 0).count();
        let identity: Option<String> = if without_rowid || pk_columns != 1 {
            None
        } else {
            raw.iter()
                .find(|c| c.3 == 1 && c.1.trim().eq_ignore_ascii_case("integer"))
                .map(|c| c.0.clone())
        };

        let columns = raw
            .into_iter()
            .map(|(name, decl, notnull, pk, hidden)| ColumnMeta {
                logical_type: convert::logical_type_from_decl(&decl).to_string(),
                nullable: notnull == 0 && pk == 0,
                is_identity: identity.as_deref() == Some(name.as_str()),
                is_key: pk > 0,
                // hidden 2 and 3 are generated columns; plain tables have no
                // hidden-1 columns.
                read_only: hidden != 0,
                size: convert::declared_size(&decl),
                owning_table: Some(canonical.clone()),
                name,
            })
            .collect();

        Ok(Some(Self {
            table: canonical,
            columns,
        }))
    }

    /// Canonical table name as spelled in the catalog.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Case-insensitive column lookup, matching SQL identifier semantics.
    pub fn get(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// The identity column, if the table has one.
    pub fn identity_column(&self) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.is_identity)
    }
}

/// Resolves a table name against the catalog, returning its canonical
/// spelling and whether it is a WITHOUT ROWID table.
fn lookup_table(conn: &Connection, table: &str) -> Result<Option<(String, bool)>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT name, wr FROM pragma_table_list \
         WHERE schema = 'main' AND type = 'table' AND name = ?1 COLLATE NOCASE",
    )?;
    let mut rows = stmt.query([table])?;
    match rows.next()? {
        Some(row) => Ok(Some((row.get(0)?, row.get::<_, i64>(1)? != 0))),
        None => Ok(None),
    }
}

/// The single owning table shared by all writable columns, or `None` when
/// the columns span multiple tables or none is writable.
pub(crate) fn common_table(columns: &[ColumnMeta]) -> Option<String> {
    let mut common: Option<&str> = None;
    for column in columns.iter().filter(|c| !c.read_only) {
        match (common, column.owning_table.as_deref()) {
            (_, None) => return None,
            (None, Some(table)) => common = Some(table),
            (Some(seen), Some(table)) if seen != table => return None,
            _ => {}
        }
    }
    common.map(str::to_string)
}
