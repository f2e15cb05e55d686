//! # sqlgate-server
//!
//! TCP server for sqlgate.
//!
//! This crate provides:
//! - TCP connection handling with async I/O
//! - Protocol framing and command dispatch
//! - Session management with one database handle per connection
//! - Change-set reconciliation over the `postback` command

pub mod config;
pub mod error;
pub mod handler;
pub mod server;
pub mod session;

pub use config::{Config, ConfigError, DatabaseConfig, LoggingConfig, NetworkConfig};
pub use error::ServerError;
pub use handler::CommandHandler;
pub use server::{Server, ServerStats};
pub use session::{Session, SessionState};
