//! Session management.

use sqlgate_db::Database;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Session state.
///
/// The state tracks the database connection, not the socket: a session in
/// `NotConnected` still has a live TCP connection and accepts `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No database attached; only `open` is accepted.
    NotConnected,
    /// A database is open and data commands are accepted.
    Connected,
    /// A `close` was handled; the connection is about to end.
    Closing,
}

/// A client session.
///
/// Owned by exactly one connection task. Commands on a session run
/// strictly one at a time, so plain fields are enough here.
pub struct Session {
    /// Unique session ID.
    pub id: String,

    /// Remote address.
    pub remote_addr: SocketAddr,

    /// Session state.
    state: SessionState,

    /// Open database handle, present in the `Connected` state.
    database: Option<Database>,

    /// Commands handled on this session.
    command_count: u64,

    /// Session creation time.
    created_at: Instant,

    /// Last completed command time.
    last_activity: Instant,
}

impl Session {
    /// Creates a new session.
    pub fn new(remote_addr: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            state: SessionState::NotConnected,
            database: None,
            command_count: 0,
            created_at: now,
            last_activity: now,
        }
    }

    /// Returns the session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Sets the session state.
    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    /// Returns whether a database is attached.
    pub fn is_connected(&self) -> bool {
        self.database.is_some()
    }

    /// Returns the attached database, if any.
    pub fn database_mut(&mut self) -> Option<&mut Database> {
        self.database.as_mut()
    }

    /// Attaches a database and moves the session to `Connected`.
    pub fn attach_database(&mut self, database: Database) {
        self.database = Some(database);
        self.state = SessionState::Connected;
    }

    /// Detaches the database, if any. The caller decides the next state.
    pub fn take_database(&mut self) -> Option<Database> {
        self.database.take()
    }

    /// Records a completed command.
    pub fn record_command(&mut self) {
        self.command_count += 1;
        self.last_activity = Instant::now();
    }

    /// Returns the command count.
    pub fn command_count(&self) -> u64 {
        self.command_count
    }

    /// Returns the time since the last completed command.
    pub fn idle_duration(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Returns the session age.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("state", &self.state)
            .field("connected", &self.database.is_some())
            .field("command_count", &self.command_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn test_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 12345)
    }

    fn memory_db() -> Database {
        Database::open(sqlgate_db::MEMORY_TARGET, Duration::from_millis(100)).unwrap()
    }

    #[test]
    fn test_session_creation() {
        let session = Session::new(test_addr());
        assert_eq!(session.state(), SessionState::NotConnected);
        assert!(!session.is_connected());
        assert_eq!(session.command_count(), 0);
    }

    #[test]
    fn test_attach_and_take_database() {
        let mut session = Session::new(test_addr());
        session.attach_database(memory_db());
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.is_connected());
        assert!(session.database_mut().is_some());

        let db = session.take_database();
        assert!(db.is_some());
        assert!(!session.is_connected());
        assert!(session.take_database().is_none());
    }

    #[test]
    fn test_record_command() {
        let mut session = Session::new(test_addr());
        session.record_command();
        session.record_command();
        assert_eq!(session.command_count(), 2);
        assert!(session.idle_duration() < Duration::from_secs(1));
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = Session::new(test_addr());
        let b = Session::new(test_addr());
        assert_ne!(a.id, b.id);
    }
}
