//! Connection management.
//!
//! The wire protocol is strictly sequential: one command goes out, one
//! reply comes back, in order. The connection mirrors that, so no request
//! ids or response routing are needed.

use crate::error::ClientError;
use sqlgate_protocol::{Command, Decoder, Encoder, Reply};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Timeout for one command round-trip.
    pub request_timeout: Duration,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl ConnectionConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }
}

/// A connection to a sqlgate server.
pub struct Connection {
    config: ConnectionConfig,
    stream: TcpStream,
    decoder: Decoder,
    read_buf: Vec<u8>,
}

impl Connection {
    /// Connects to the server.
    pub async fn connect(config: ConnectionConfig) -> Result<Self, ClientError> {
        tracing::debug!("Connecting to {}...", config.addr);

        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(config.addr))
            .await
            .map_err(|_| ClientError::Timeout)?
            .map_err(ClientError::Io)?;

        stream.set_nodelay(true).ok();
        tracing::debug!("Connected to {}", config.addr);

        let read_buf = vec![0u8; config.read_buffer_size];
        Ok(Self {
            config,
            stream,
            decoder: Decoder::new(),
            read_buf,
        })
    }

    /// Sends one command and waits for its reply.
    pub async fn send(&mut self, command: &Command) -> Result<Reply, ClientError> {
        let encoded = Encoder::encode_command(command)?;
        tracing::debug!("Sending {} ({} bytes)", command.name(), encoded.len());
        self.stream.write_all(&encoded).await.map_err(ClientError::Io)?;
        self.read_reply().await
    }

    /// Reads until one complete reply decodes, bounded by the request
    /// timeout.
    async fn read_reply(&mut self) -> Result<Reply, ClientError> {
        let timeout = self.config.request_timeout;
        tokio::time::timeout(timeout, async {
            loop {
                if let Some(reply) = self.decoder.decode_reply()? {
                    return Ok(reply);
                }
                let n = self
                    .stream
                    .read(&mut self.read_buf)
                    .await
                    .map_err(ClientError::Io)?;
                if n == 0 {
                    return Err(ClientError::Disconnected);
                }
                self.decoder.extend(&self.read_buf[..n]);
            }
        })
        .await
        .map_err(|_| ClientError::Timeout)?
    }

    /// Returns the address of the remote peer.
    pub fn peer_addr(&self) -> Result<SocketAddr, ClientError> {
        self.stream.peer_addr().map_err(ClientError::Io)
    }

    /// Shuts the connection down.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.shutdown().await.map_err(ClientError::Io)
    }
}
