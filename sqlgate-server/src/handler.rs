//! Command handlers.
//!
//! One handler serves every connection; all per-connection state lives in
//! the [`Session`]. Command failures become error replies, never
//! connection errors: only framing-level problems end a connection.

use crate::config::DatabaseConfig;
use crate::session::{Session, SessionState};
use sqlgate_db::{Database, DbError, MEMORY_TARGET};
use sqlgate_protocol::{ChangeSet, Command, Reply};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Fixed error strings clients match on.
const INVALID_COMMAND: &str = "invalid command";
const NOT_CONNECTED: &str = "not connected";
const ALREADY_CONNECTED: &str = "already connected";
const UNKNOWN_COMMAND: &str = "unknown command";
const OUTSIDE_ROOT: &str = "database target is outside the allowed directory";

/// Command handler.
pub struct CommandHandler {
    /// Lock wait bound applied to every database this handler opens.
    busy_timeout: Duration,
    /// Directory open targets are resolved under, when configured.
    root_dir: Option<PathBuf>,
}

impl CommandHandler {
    /// Creates a new command handler.
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            busy_timeout: config.busy_timeout(),
            root_dir: config.root_dir.clone(),
        }
    }

    /// Handles one framed command payload and produces the reply.
    pub fn handle(&self, session: &mut Session, payload: &str) -> Reply {
        session.record_command();

        let command: Command = match serde_json::from_str(payload) {
            Ok(command) => command,
            Err(err) => {
                tracing::debug!(session = %session.id, error = %err, "unparseable command");
                return Reply::error(INVALID_COMMAND);
            }
        };
        tracing::debug!(session = %session.id, command = command.name(), "dispatching");

        match command {
            Command::Open { text } => self.handle_open(session, &text),
            Command::Close { .. } => self.handle_close(session),
            Command::Query { text } => {
                Self::data_command(session, |db| Ok(Reply::Query(db.query(&text)?)))
            }
            Command::QuerySingle { text } => {
                Self::data_command(session, |db| Ok(Reply::Query(db.query_single(&text)?)))
            }
            Command::QueryValue { text } => {
                Self::data_command(session, |db| Ok(Reply::Query(db.query_value(&text)?)))
            }
            Command::Execute { text } => {
                Self::data_command(session, |db| Ok(Reply::Query(db.execute(&text)?)))
            }
            Command::Table { text } => {
                Self::data_command(session, |db| Ok(Reply::Table(db.query_table(&text)?)))
            }
            Command::Postback { text } => Self::handle_postback(session, &text),
            Command::Unknown => Reply::error(UNKNOWN_COMMAND),
        }
    }

    /// Runs a command that needs an attached database. Database failures
    /// become error replies; the session stays usable.
    fn data_command<F>(session: &mut Session, run: F) -> Reply
    where
        F: FnOnce(&mut Database) -> Result<Reply, DbError>,
    {
        match session.database_mut() {
            Some(db) => run(db).unwrap_or_else(|err| Reply::error(err.to_string())),
            None => Reply::error(NOT_CONNECTED),
        }
    }

    fn handle_open(&self, session: &mut Session, target: &str) -> Reply {
        if session.is_connected() {
            return Reply::error(ALREADY_CONNECTED);
        }
        let target = match self.resolve_target(target) {
            Ok(target) => target,
            Err(message) => return Reply::error(message),
        };
        match Database::open(&target, self.busy_timeout) {
            Ok(db) => {
                tracing::info!(session = %session.id, target = %target, "database opened");
                session.attach_database(db);
                Reply::Ok
            }
            Err(err) => Reply::error(err.to_string()),
        }
    }

    fn handle_close(&self, session: &mut Session) -> Reply {
        match session.take_database() {
            Some(db) => {
                if let Err(err) = db.close() {
                    tracing::warn!(session = %session.id, error = %err, "close failed");
                }
                session.set_state(SessionState::Closing);
                Reply::Ok
            }
            None => Reply::error(NOT_CONNECTED),
        }
    }

    fn handle_postback(session: &mut Session, text: &str) -> Reply {
        if !session.is_connected() {
            return Reply::error(NOT_CONNECTED);
        }
        let change: ChangeSet = match serde_json::from_str(text) {
            Ok(change) => change,
            Err(err) => return Reply::error(err.to_string()),
        };
        Self::data_command(session, |db| Ok(Reply::Postback(db.postback(&change)?)))
    }

    /// Maps a client-supplied target onto the configured root directory.
    ///
    /// `:memory:` always passes through. Without a root, targets are used
    /// as given. With a root, only relative paths that stay inside it are
    /// accepted.
    fn resolve_target(&self, target: &str) -> Result<String, &'static str> {
        if target == MEMORY_TARGET {
            return Ok(target.to_string());
        }
        let Some(root) = &self.root_dir else {
            return Ok(target.to_string());
        };
        let path = Path::new(target);
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_absolute() || escapes {
            return Err(OUTSIDE_ROOT);
        }
        Ok(root.join(path).to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlgate_protocol::SqlValue;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn handler() -> CommandHandler {
        CommandHandler::new(&DatabaseConfig::default())
    }

    fn session() -> Session {
        Session::new(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            12345,
        ))
    }

    fn command(kind: &str, text: &str) -> String {
        json!({ "type": kind, "text": text }).to_string()
    }

    fn open_memory(handler: &CommandHandler, session: &mut Session) {
        let reply = handler.handle(session, &command("open", ":memory:"));
        assert_eq!(reply, Reply::Ok);
    }

    fn error_text(reply: Reply) -> String {
        match reply {
            Reply::Error { error } => error,
            other => panic!("expected error reply, got {other:?}"),
        }
    }

    #[test]
    fn test_data_commands_require_open() {
        let handler = handler();
        let mut session = session();

        for kind in ["query", "querysingle", "queryvalue", "execute", "table"] {
            let reply = handler.handle(&mut session, &command(kind, "SELECT 1"));
            assert_eq!(error_text(reply), NOT_CONNECTED, "command {kind}");
        }
        let reply = handler.handle(&mut session, &command("postback", "{}"));
        assert_eq!(error_text(reply), NOT_CONNECTED);
        let reply = handler.handle(&mut session, &command("close", ""));
        assert_eq!(error_text(reply), NOT_CONNECTED);
    }

    #[test]
    fn test_open_twice_is_rejected() {
        let handler = handler();
        let mut session = session();
        open_memory(&handler, &mut session);

        let reply = handler.handle(&mut session, &command("open", ":memory:"));
        assert_eq!(error_text(reply), ALREADY_CONNECTED);
        // The original database is untouched.
        assert!(session.is_connected());
    }

    #[test]
    fn test_open_then_execute_then_query() {
        let handler = handler();
        let mut session = session();
        open_memory(&handler, &mut session);

        let reply = handler.handle(
            &mut session,
            &command("execute", "CREATE TABLE t (x INT, y TEXT)"),
        );
        match reply {
            Reply::Query(data) => {
                assert_eq!(data.rows[0].get("rowsAffected"), Some(&SqlValue::Int(0)));
            }
            other => panic!("expected query reply, got {other:?}"),
        }

        let reply = handler.handle(
            &mut session,
            &command("execute", "INSERT INTO t VALUES (1, 'one'), (2, 'two')"),
        );
        match reply {
            Reply::Query(data) => {
                assert_eq!(data.rows[0].get("rowsAffected"), Some(&SqlValue::Int(2)));
            }
            other => panic!("expected query reply, got {other:?}"),
        }

        let reply = handler.handle(&mut session, &command("query", "SELECT * FROM t ORDER BY x"));
        match reply {
            Reply::Query(data) => {
                assert_eq!(data.rows.len(), 2);
                assert_eq!(data.rows[1].get("y"), Some(&SqlValue::Text("two".into())));
                assert_eq!(data.columns.get("x").map(String::as_str), Some("int"));
            }
            other => panic!("expected query reply, got {other:?}"),
        }
    }

    #[test]
    fn test_sql_errors_keep_session_usable() {
        let handler = handler();
        let mut session = session();
        open_memory(&handler, &mut session);

        let reply = handler.handle(&mut session, &command("execute", "NOT REAL SQL"));
        assert!(reply.is_error());

        let reply = handler.handle(&mut session, &command("queryvalue", "SELECT 41 + 1"));
        match reply {
            Reply::Query(data) => {
                assert_eq!(data.rows[0].get("value"), Some(&SqlValue::Int(42)));
            }
            other => panic!("expected query reply, got {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_payload() {
        let handler = handler();
        let mut session = session();

        let reply = handler.handle(&mut session, "this is not json");
        assert_eq!(error_text(reply), INVALID_COMMAND);

        // Recognized type but missing the text field.
        let reply = handler.handle(&mut session, r#"{"type":"query"}"#);
        assert_eq!(error_text(reply), INVALID_COMMAND);
    }

    #[test]
    fn test_unrecognized_command_type() {
        let handler = handler();
        let mut session = session();
        let reply = handler.handle(&mut session, &command("frobnicate", "x"));
        assert_eq!(error_text(reply), UNKNOWN_COMMAND);
    }

    #[test]
    fn test_close_marks_session_closing() {
        let handler = handler();
        let mut session = session();
        open_memory(&handler, &mut session);

        let reply = handler.handle(&mut session, r#"{"type":"close"}"#);
        assert_eq!(reply, Reply::Ok);
        assert_eq!(session.state(), SessionState::Closing);
        assert!(!session.is_connected());
    }

    #[test]
    fn test_postback_through_handler() {
        let handler = handler();
        let mut session = session();
        open_memory(&handler, &mut session);
        handler.handle(
            &mut session,
            &command("execute", "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)"),
        );

        let change = json!({
            "tablename": "t",
            "inserted": [{ "v": "a" }, { "v": "b" }],
        })
        .to_string();
        let reply = handler.handle(&mut session, &command("postback", &change));
        match reply {
            Reply::Postback(data) => {
                assert_eq!(data.idcolumn.as_deref(), Some("id"));
                assert_eq!(data.identities, vec![1, 2]);
            }
            other => panic!("expected postback reply, got {other:?}"),
        }
    }

    #[test]
    fn test_postback_with_bad_change_set() {
        let handler = handler();
        let mut session = session();
        open_memory(&handler, &mut session);

        let reply = handler.handle(&mut session, &command("postback", "[1, 2, 3]"));
        assert!(reply.is_error());
        // Not the generic parse error: the envelope itself was fine.
        assert_ne!(error_text(reply), INVALID_COMMAND);
    }

    #[test]
    fn test_root_dir_confines_targets() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            root_dir: Some(dir.path().to_path_buf()),
            ..DatabaseConfig::default()
        };
        let handler = CommandHandler::new(&config);

        for target in ["../outside.db", "/etc/passwd", "a/../../b.db"] {
            let mut session = session();
            let reply = handler.handle(&mut session, &command("open", target));
            assert_eq!(error_text(reply), OUTSIDE_ROOT, "target {target}");
        }

        let mut session = session();
        let reply = handler.handle(&mut session, &command("open", "inside.db"));
        assert_eq!(reply, Reply::Ok);
        assert!(dir.path().join("inside.db").exists());

        // :memory: is always allowed.
        let mut session = self::session();
        open_memory(&handler, &mut session);
    }
}
