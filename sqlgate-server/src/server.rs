//! TCP server implementation.

use crate::config::Config;
use crate::error::ServerError;
use crate::handler::CommandHandler;
use crate::session::{Session, SessionState};
use chrono::{DateTime, Utc};
use sqlgate_protocol::{Decoder, Encoder, Reply};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Server statistics.
#[derive(Debug)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub commands_total: AtomicU64,
    pub errors_total: AtomicU64,
    /// Wall-clock time the server was created.
    pub started_at: DateTime<Utc>,
}

impl ServerStats {
    fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            commands_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    /// Returns how long the server has existed.
    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

/// TCP server for sqlgate.
pub struct Server {
    config: Config,
    handler: Arc<CommandHandler>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: Config) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let handler = CommandHandler::new(&config.database);
        Self {
            config,
            handler: Arc::new(handler),
            stats: Arc::new(ServerStats::new()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Runs the server on the configured bind address.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.network.bind_addr).await?;
        self.serve(listener).await
    }

    /// Runs the accept loop on an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Server listening on {}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.accept(stream, addr),
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Admits or rejects one accepted connection.
    fn accept(&self, stream: TcpStream, addr: SocketAddr) {
        if self.stats.connections_active.load(Ordering::Relaxed)
            >= self.config.network.max_connections as u64
        {
            tracing::warn!("Connection limit reached, rejecting {}", addr);
            tokio::spawn(async move {
                let mut stream = stream;
                let reply = Reply::error("server at connection capacity");
                if let Ok(bytes) = Encoder::encode_reply(&reply) {
                    let _ = stream.write_all(&bytes).await;
                }
                let _ = stream.shutdown().await;
            });
            return;
        }

        self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
        self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

        let handler = self.handler.clone();
        let stats = self.stats.clone();
        let idle_timeout = self.config.network.idle_timeout();
        let mut conn_shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let result = Self::handle_connection(
                stream,
                addr,
                handler,
                stats.clone(),
                idle_timeout,
                &mut conn_shutdown,
            )
            .await;

            match result {
                Ok(()) | Err(ServerError::ShuttingDown) => {}
                Err(e) => {
                    tracing::debug!("[{}] Connection error: {}", addr, e);
                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                }
            }

            stats.connections_active.fetch_sub(1, Ordering::Relaxed);
            tracing::info!("Client disconnected: {}", addr);
        });
    }

    /// Handles a single connection.
    async fn handle_connection(
        mut stream: TcpStream,
        addr: SocketAddr,
        handler: Arc<CommandHandler>,
        stats: Arc<ServerStats>,
        idle_timeout: Duration,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        tracing::info!("Client connected: {}", addr);

        let mut session = Session::new(addr);
        let mut decoder = Decoder::new();
        let mut buf = [0u8; 8192];

        let result = 'conn: loop {
            tokio::select! {
                result = stream.read(&mut buf) => {
                    match result {
                        Ok(0) => {
                            tracing::debug!("[{}] Connection closed by client", addr);
                            break 'conn Ok(());
                        }
                        Ok(n) => {
                            tracing::trace!("[{}] Received {} bytes", addr, n);
                            decoder.extend(&buf[..n]);
                        }
                        Err(e) => break 'conn Err(ServerError::Io(e)),
                    }
                }
                _ = tokio::time::sleep(idle_timeout) => {
                    if session.idle_duration() >= idle_timeout {
                        tracing::debug!("[{}] Idle timeout", addr);
                        break 'conn Ok(());
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("[{}] Shutdown signal received", addr);
                    break 'conn Err(ServerError::ShuttingDown);
                }
            }

            // Process any complete frames
            loop {
                let payload = match decoder.decode_payload() {
                    Ok(Some(payload)) => payload,
                    Ok(None) => break,
                    Err(e) => {
                        // Framing is unrecoverable; the stream position is lost.
                        tracing::warn!("[{}] Protocol error: {}", addr, e);
                        break 'conn Err(ServerError::Protocol(e));
                    }
                };

                stats.commands_total.fetch_add(1, Ordering::Relaxed);
                let reply = handler.handle(&mut session, &payload);
                if reply.is_error() {
                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                }

                let bytes = match Encoder::encode_reply(&reply) {
                    Ok(bytes) => bytes,
                    Err(e) => break 'conn Err(ServerError::Protocol(e)),
                };
                if let Err(e) = stream.write_all(&bytes).await {
                    break 'conn Err(ServerError::Io(e));
                }

                if session.state() == SessionState::Closing {
                    tracing::debug!("[{}] Session closing", addr);
                    break 'conn Ok(());
                }
            }
        };

        Self::finish_session(&mut session);
        let _ = stream.shutdown().await;
        result
    }

    /// Releases the session's database handle, if one is still attached.
    fn finish_session(session: &mut Session) {
        if let Some(db) = session.take_database() {
            if let Err(e) = db.close() {
                tracing::warn!("Failed to close database for session {}: {}", session.id, e);
            }
        }
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}
