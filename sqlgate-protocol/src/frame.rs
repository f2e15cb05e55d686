//! Text frame format for the command protocol.
//!
//! Frame layout:
//!
//! ```text
//! +-----------------------+------+-----------------------+
//! | payload byte length   | \r\n | payload               |
//! | decimal ASCII digits  |      | `length` bytes, UTF-8 |
//! +-----------------------+------+-----------------------+
//! ```
//!
//! The length counts payload **bytes**, not characters. Bytes beyond one
//! complete frame belong to the next frame and stay in the buffer.

use crate::error::ProtocolError;
use crate::MAX_PAYLOAD_SIZE;
use bytes::{Buf, BufMut, BytesMut};

/// Maximum number of digits in the length prefix. A buffer that grows past
/// this without a CR-LF cannot be the start of a valid frame.
pub const MAX_LENGTH_DIGITS: usize = 10;

/// A single protocol frame carrying one UTF-8 JSON payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: String,
}

impl Frame {
    /// Creates a frame with the given payload.
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Creates a frame from a JSON-serializable value.
    pub fn from_json<T: serde::Serialize>(value: &T) -> Result<Self, ProtocolError> {
        Ok(Self::new(serde_json::to_string(value)?))
    }

    /// Returns the frame payload.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Consumes the frame, returning its payload.
    pub fn into_payload(self) -> String {
        self.payload
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let payload_len = self.payload.len();
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let prefix = payload_len.to_string();
        let mut buf = BytesMut::with_capacity(prefix.len() + 2 + payload_len);
        buf.put_slice(prefix.as_bytes());
        buf.put_slice(b"\r\n");
        buf.put_slice(self.payload.as_bytes());
        Ok(buf)
    }

    /// Decodes a frame from the front of `buf`.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded (consuming
    /// exactly that frame from `buf`), `Ok(None)` if more data is needed,
    /// or `Err` on protocol errors. The buffer is not consumed on `Ok(None)`
    /// or `Err`.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        // The CR-LF must appear within the first MAX_LENGTH_DIGITS + 2 bytes.
        let window_len = buf.len().min(MAX_LENGTH_DIGITS + 2);
        let crlf = buf[..window_len].windows(2).position(|w| w == b"\r\n");

        let prefix_len = match crlf {
            Some(pos) => pos,
            None if buf.len() < MAX_LENGTH_DIGITS + 2 => return Ok(None),
            None => {
                let prefix = String::from_utf8_lossy(&buf[..window_len]).into_owned();
                return Err(ProtocolError::InvalidLength(prefix));
            }
        };

        let prefix = &buf[..prefix_len];
        if prefix.is_empty() || !prefix.iter().all(u8::is_ascii_digit) {
            return Err(ProtocolError::InvalidLength(
                String::from_utf8_lossy(prefix).into_owned(),
            ));
        }

        let mut payload_len: usize = 0;
        for &digit in prefix {
            payload_len = payload_len
                .checked_mul(10)
                .and_then(|n| n.checked_add(usize::from(digit - b'0')))
                .ok_or_else(|| {
                    ProtocolError::InvalidLength(String::from_utf8_lossy(prefix).into_owned())
                })?;
        }

        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        if buf.len() < prefix_len + 2 + payload_len {
            return Ok(None);
        }

        buf.advance(prefix_len + 2);
        let payload_bytes = buf.split_to(payload_len);
        let payload = String::from_utf8(payload_bytes.to_vec())
            .map_err(|_| ProtocolError::InvalidUtf8)?;

        Ok(Some(Self { payload }))
    }
}
