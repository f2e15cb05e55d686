//! JSON command and reply envelopes.

use crate::value::Row;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A client command.
///
/// Requests are internally tagged by `type`, carrying the command argument
/// in `text`: the database target for `open`, SQL for the data commands,
/// and a JSON-encoded [`ChangeSet`] for `postback`. Unrecognized command
/// names deserialize to [`Command::Unknown`] so dispatch stays an
/// exhaustive match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Command {
    Open { text: String },
    Close {
        #[serde(default)]
        text: String,
    },
    Query { text: String },
    QuerySingle { text: String },
    QueryValue { text: String },
    Execute { text: String },
    Table { text: String },
    Postback { text: String },
    #[serde(other)]
    Unknown,
}

impl Command {
    /// Command name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Open { .. } => "open",
            Command::Close { .. } => "close",
            Command::Query { .. } => "query",
            Command::QuerySingle { .. } => "querysingle",
            Command::QueryValue { .. } => "queryvalue",
            Command::Execute { .. } => "execute",
            Command::Table { .. } => "table",
            Command::Postback { .. } => "postback",
            Command::Unknown => "unknown",
        }
    }
}

/// A server reply, internally tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Reply {
    Ok,
    Error { error: String },
    Query(QueryData),
    Table(TableData),
    Postback(PostbackData),
}

impl Reply {
    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error { .. })
    }
}

/// Rows plus per-column logical types, captured from the first row only.
/// A result with zero rows has an empty column map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryData {
    pub rows: Vec<Row>,
    pub columns: IndexMap<String, String>,
}

/// Rows plus full column schema, as returned by the `table` command.
///
/// `tablename` is the single base table the writable result columns belong
/// to, or `None` when the query does not map onto one table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableData {
    pub rows: Vec<Row>,
    pub tablename: Option<String>,
    pub columns: Vec<ColumnMeta>,
}

/// Result of a `postback`: the identity column (if the target table has
/// one) and the keys generated for inserted rows, in insert order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PostbackData {
    pub idcolumn: Option<String>,
    pub identities: Vec<i64>,
}

/// Metadata for one result column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMeta {
    pub name: String,
    pub logical_type: String,
    pub nullable: bool,
    pub is_identity: bool,
    pub is_key: bool,
    pub read_only: bool,
    pub size: Option<u32>,
    pub owning_table: Option<String>,
}

/// A client-computed batch of row changes, carried JSON-encoded in the
/// `text` of a `postback` command.
///
/// `updated_new[i]` and `updated_old[i]` describe the same logical row:
/// the values to store and the last-known stored values. The pairing is
/// positional.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    #[serde(default)]
    pub tablename: String,
    #[serde(default)]
    pub inserted: Vec<Row>,
    #[serde(default)]
    pub deleted: Vec<Row>,
    #[serde(default)]
    pub updated_new: Vec<Row>,
    #[serde(default)]
    pub updated_old: Vec<Row>,
}

impl ChangeSet {
    pub fn new(tablename: impl Into<String>) -> Self {
        Self {
            tablename: tablename.into(),
            ..Default::default()
        }
    }

    /// True when the change-set carries no row changes at all.
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty()
            && self.deleted.is_empty()
            && self.updated_new.is_empty()
            && self.updated_old.is_empty()
    }
}
