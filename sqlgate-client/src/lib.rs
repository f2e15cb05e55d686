//! # sqlgate-client
//!
//! Client library for sqlgate.
//!
//! This crate provides:
//! - Async TCP connection with framed command/reply exchange
//! - A typed API for every server command
//! - Round-trip and connect timeouts

pub mod client;
pub mod connection;
pub mod error;

pub use client::Client;
pub use connection::{Connection, ConnectionConfig};
pub use error::ClientError;
