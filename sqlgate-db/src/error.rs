//! Database error types.

use std::fmt;
use thiserror::Error;

/// Errors from the database gateway.
///
/// `Display` output is what clients see in `error` replies, so messages
/// carry the concrete table/column/row involved. SQLite failures pass
/// through verbatim.
#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("unknown table \"{0}\"")]
    UnknownTable(String),

    #[error("unknown column \"{column}\" in table \"{table}\"")]
    UnknownColumn { column: String, table: String },

    #[error("inserted row {index} has no value for column \"{column}\"")]
    MissingInsertValue { index: usize, column: String },

    #[error("updated_new and updated_old differ in length ({new} vs {old})")]
    MismatchedUpdate { new: usize, old: usize },

    #[error("change row has no columns")]
    EmptyChangeRow,

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("a transaction is already open")]
    TransactionOpen,

    #[error("no open transaction")]
    NoTransaction,
}

/// Which mutation of a postback failed its exactly-one-row check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePhase {
    Insert,
    Delete,
    Update,
}

impl fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcilePhase::Insert => write!(f, "insert"),
            ReconcilePhase::Delete => write!(f, "delete"),
            ReconcilePhase::Update => write!(f, "update"),
        }
    }
}

/// A postback mutation affected an unexpected number of rows.
///
/// For deletes and updates an `affected` of 0 is the optimistic concurrency
/// failure: the stored row no longer matches the client's snapshot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("postback {phase} for row {index} affected {affected} rows, expected exactly 1")]
pub struct ReconcileError {
    pub phase: ReconcilePhase,
    pub index: usize,
    pub affected: usize,
}
