//! Encoder and decoder for protocol frames.

use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::message::{Command, Reply};
use bytes::BytesMut;

/// Encodes commands and replies into frames.
pub struct Encoder;

impl Encoder {
    /// Encodes a command into a frame.
    pub fn encode_command(command: &Command) -> Result<BytesMut, ProtocolError> {
        Frame::from_json(command)?.encode()
    }

    /// Encodes a reply into a frame.
    pub fn encode_reply(reply: &Reply) -> Result<BytesMut, ProtocolError> {
        Frame::from_json(reply)?.encode()
    }

    /// Encodes a raw payload into a frame.
    pub fn encode_payload(payload: impl Into<String>) -> Result<BytesMut, ProtocolError> {
        Frame::new(payload).encode()
    }
}

/// Incremental frame decoder over an internal accumulation buffer.
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next frame from the buffer.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        Frame::decode(&mut self.buffer)
    }

    /// Attempts to decode the next frame, returning just its payload.
    ///
    /// Envelope JSON is deliberately not parsed here: on the server side a
    /// malformed envelope is a recoverable command error, not a framing
    /// error.
    pub fn decode_payload(&mut self) -> Result<Option<String>, ProtocolError> {
        Ok(self.decode_frame()?.map(Frame::into_payload))
    }

    /// Attempts to decode the next frame as a [`Reply`].
    ///
    /// Used on the client side, where an undecodable reply means the peer
    /// is not speaking this protocol.
    pub fn decode_reply(&mut self) -> Result<Option<Reply>, ProtocolError> {
        match self.decode_frame()? {
            Some(frame) => Ok(Some(serde_json::from_str(frame.payload())?)),
            None => Ok(None),
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encoder_decoder_roundtrip() {
        let command = Command::Query {
            text: "SELECT * FROM t".to_string(),
        };
        let encoded = Encoder::encode_command(&command).unwrap();

        let mut decoder = Decoder::new();
        decoder.extend(&encoded);

        let payload = decoder.decode_payload().unwrap().unwrap();
        let decoded: Command = serde_json::from_str(&payload).unwrap();
        assert_eq!(decoded, command);
    }

    #[test]
    fn test_partial_frame_decoding() {
        let encoded = Encoder::encode_payload(r#"{"type":"ok"}"#).unwrap();

        let mut decoder = Decoder::new();

        // Feed one byte at a time; nothing decodes until the last byte.
        for &byte in &encoded[..encoded.len() - 1] {
            decoder.extend(&[byte]);
            assert!(decoder.decode_payload().unwrap().is_none());
        }
        decoder.extend(&encoded[encoded.len() - 1..]);
        let payload = decoder.decode_payload().unwrap().unwrap();
        assert_eq!(payload, r#"{"type":"ok"}"#);
    }

    #[test]
    fn test_multiple_frames_single_extend() {
        let mut data = Vec::new();
        data.extend_from_slice(&Encoder::encode_payload("first").unwrap());
        data.extend_from_slice(&Encoder::encode_payload("second").unwrap());

        let mut decoder = Decoder::new();
        decoder.extend(&data);

        assert_eq!(decoder.decode_payload().unwrap().unwrap(), "first");
        assert_eq!(decoder.decode_payload().unwrap().unwrap(), "second");
        assert!(decoder.decode_payload().unwrap().is_none());
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decode_reply() {
        let encoded = Encoder::encode_reply(&Reply::error("not connected")).unwrap();

        let mut decoder = Decoder::new();
        decoder.extend(&encoded);

        let reply = decoder.decode_reply().unwrap().unwrap();
        assert_eq!(reply, Reply::error("not connected"));
    }

    #[test]
    fn test_decode_reply_bad_json_is_protocol_error() {
        let encoded = Encoder::encode_payload("this is not json").unwrap();

        let mut decoder = Decoder::new();
        decoder.extend(&encoded);

        let result = decoder.decode_reply();
        assert!(matches!(result, Err(ProtocolError::Json(_))));
    }

    #[test]
    fn test_decoder_buffered_and_clear() {
        let mut decoder = Decoder::new();
        assert_eq!(decoder.buffered(), 0);

        decoder.extend(b"123");
        assert_eq!(decoder.buffered(), 3);

        decoder.clear();
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decoder_default() {
        let decoder = Decoder::default();
        assert_eq!(decoder.buffered(), 0);
    }

    proptest! {
        /// Any sequence of payloads survives encoding, concatenation and
        /// decoding with arbitrary chunk boundaries.
        #[test]
        fn prop_split_reassembly(
            payloads in proptest::collection::vec(".{0,64}", 1..8),
            chunk_size in 1usize..32,
        ) {
            let mut stream = Vec::new();
            for payload in &payloads {
                stream.extend_from_slice(&Encoder::encode_payload(payload.clone()).unwrap());
            }

            let mut decoder = Decoder::new();
            let mut decoded = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                decoder.extend(chunk);
                while let Some(payload) = decoder.decode_payload().unwrap() {
                    decoded.push(payload);
                }
            }

            prop_assert_eq!(decoded, payloads);
        }
    }
}
