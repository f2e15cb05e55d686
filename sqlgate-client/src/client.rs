//! High-level client API.

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;
use sqlgate_protocol::{
    ChangeSet, Command, PostbackData, QueryData, Reply, Row, SqlValue, TableData,
};

/// High-level client for sqlgate.
///
/// Wraps a [`Connection`] with one typed method per command. Server-side
/// command failures surface as [`ClientError::Server`] carrying the
/// server's message.
pub struct Client {
    conn: Connection,
}

impl Client {
    /// Connects to the server.
    pub async fn connect(config: ConnectionConfig) -> Result<Self, ClientError> {
        let conn = Connection::connect(config).await?;
        Ok(Self { conn })
    }

    /// Opens a database on the server. The target is a path as seen by
    /// the server, or `:memory:`.
    pub async fn open(&mut self, target: &str) -> Result<(), ClientError> {
        match self.send("open", Command::Open { text: target.to_string() }).await? {
            Reply::Ok => Ok(()),
            _ => Err(ClientError::UnexpectedReply { command: "open" }),
        }
    }

    /// Closes the database and the connection. The server hangs up after
    /// acknowledging, so the client is consumed.
    pub async fn close(mut self) -> Result<(), ClientError> {
        let command = Command::Close {
            text: String::new(),
        };
        match self.send("close", command).await? {
            Reply::Ok => self.conn.close().await,
            _ => Err(ClientError::UnexpectedReply { command: "close" }),
        }
    }

    /// Runs a query and returns all rows with per-column logical types.
    pub async fn query(&mut self, sql: &str) -> Result<QueryData, ClientError> {
        match self.send("query", Command::Query { text: sql.to_string() }).await? {
            Reply::Query(data) => Ok(data),
            _ => Err(ClientError::UnexpectedReply { command: "query" }),
        }
    }

    /// Runs a query and returns the first row, if any.
    pub async fn query_single(&mut self, sql: &str) -> Result<Option<Row>, ClientError> {
        let command = Command::QuerySingle {
            text: sql.to_string(),
        };
        match self.send("querysingle", command).await? {
            Reply::Query(data) => Ok(data.rows.into_iter().next()),
            _ => Err(ClientError::UnexpectedReply {
                command: "querysingle",
            }),
        }
    }

    /// Runs a query and returns the first column of the first row.
    /// A query with no rows yields [`SqlValue::Null`].
    pub async fn query_value(&mut self, sql: &str) -> Result<SqlValue, ClientError> {
        let command = Command::QueryValue {
            text: sql.to_string(),
        };
        match self.send("queryvalue", command).await? {
            Reply::Query(data) => Ok(data
                .rows
                .first()
                .and_then(|row| row.get("value").cloned())
                .unwrap_or(SqlValue::Null)),
            _ => Err(ClientError::UnexpectedReply {
                command: "queryvalue",
            }),
        }
    }

    /// Executes a mutating statement and returns the affected row count.
    pub async fn execute(&mut self, sql: &str) -> Result<i64, ClientError> {
        let command = Command::Execute {
            text: sql.to_string(),
        };
        match self.send("execute", command).await? {
            Reply::Query(data) => match data.rows.first().and_then(|row| row.get("rowsAffected")) {
                Some(SqlValue::Int(n)) => Ok(*n),
                _ => Err(ClientError::UnexpectedReply { command: "execute" }),
            },
            _ => Err(ClientError::UnexpectedReply { command: "execute" }),
        }
    }

    /// Runs a query and returns rows with full column schema.
    pub async fn table(&mut self, sql: &str) -> Result<TableData, ClientError> {
        match self.send("table", Command::Table { text: sql.to_string() }).await? {
            Reply::Table(data) => Ok(data),
            _ => Err(ClientError::UnexpectedReply { command: "table" }),
        }
    }

    /// Submits a change-set for transactional reconciliation.
    pub async fn postback(&mut self, change: &ChangeSet) -> Result<PostbackData, ClientError> {
        let command = Command::Postback {
            text: serde_json::to_string(change)?,
        };
        match self.send("postback", command).await? {
            Reply::Postback(data) => Ok(data),
            _ => Err(ClientError::UnexpectedReply { command: "postback" }),
        }
    }

    async fn send(&mut self, name: &'static str, command: Command) -> Result<Reply, ClientError> {
        match self.conn.send(&command).await? {
            Reply::Error { error } => {
                tracing::debug!(command = name, error = %error, "command rejected");
                Err(ClientError::Server(error))
            }
            reply => Ok(reply),
        }
    }
}
