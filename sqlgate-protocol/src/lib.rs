//! Wire protocol for sqlgate.
//!
//! Every message, in both directions, is a single frame: the payload byte
//! length as decimal ASCII, a CR-LF, then that many bytes of UTF-8 JSON.
//! Requests are [`Command`] envelopes (`{"type": ..., "text": ...}`),
//! responses are [`Reply`] envelopes discriminated the same way.
//!
//! This crate also defines the value model shared by both directions:
//! [`SqlValue`], ordered [`Row`]s, result payloads and the [`ChangeSet`]
//! carried by the `postback` command.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod value;

pub use codec::{Decoder, Encoder};
pub use error::ProtocolError;
pub use frame::Frame;
pub use message::{ChangeSet, ColumnMeta, Command, PostbackData, QueryData, Reply, TableData};
pub use value::{Row, SqlValue};

/// Default TCP port for sqlgate servers.
pub const DEFAULT_PORT: u16 = 10980;

/// Maximum allowed frame payload size in bytes (16 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;
