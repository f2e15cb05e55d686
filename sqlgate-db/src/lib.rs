//! SQLite gateway for sqlgate.
//!
//! [`Database`] wraps one session-scoped SQLite connection and exposes the
//! operations the command protocol needs: queries returning typed rows,
//! statement execution, full-schema table fetches, and the postback
//! reconciler that applies a client [`ChangeSet`] inside a single
//! transaction with optimistic concurrency checks.
//!
//! [`ChangeSet`]: sqlgate_protocol::ChangeSet

mod convert;
mod postback;
mod resolve;

pub mod database;
pub mod error;
pub mod schema;

pub use database::Database;
pub use error::{DbError, ReconcileError, ReconcilePhase};
pub use schema::TableSchema;

/// Target string that opens an in-memory database.
pub const MEMORY_TARGET: &str = ":memory:";
