//! Connection Handler Module
//!
//! Each client gets its own handler task that runs in a loop, reading lines
//! and writing one reply line per command.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  Read bytes from socket      │
//!    │           │                  │
//!    │           ▼                  │
//!    │  Split off complete lines    │
//!    │           │                  │
//!    │           ▼                  │
//!    │  Execute command             │
//!    │           │                  │
//!    │           ▼                  │
//!    │  Send reply line             │
//!    │           │                  │
//!    │      [Loop back]             │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. EOF / I/O error / QUIT
//!        │
//!        ▼
//! 5. Handler task ends
//! ```
//!
//! ## Buffer Management
//!
//! Incoming data accumulates in a `BytesMut` buffer. TCP is a stream, so one
//! read can hold half a line or several pipelined lines. The line parser caps
//! the length of a single line, which bounds the buffer.

use crate::commands::CommandHandler;
use crate::protocol::{Command, Frame, LineParser, Reply};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, trace, warn};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Server-wide connection statistics
#[derive(Debug)]
pub struct ConnectionStats {
    /// When the server started
    started_at: Instant,
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Lines answered with a protocol error
    pub protocol_errors: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl Default for ConnectionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            connections_accepted: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            commands_processed: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
///
/// Generic over the stream so the loop can run on a `TcpStream` or on an
/// in-memory mock.
pub struct ConnectionHandler<S> {
    /// The client stream
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// The command handler (shared across connections)
    command_handler: CommandHandler,

    /// Line framing
    parser: LineParser,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The client stream
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing commands
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: LineParser::new(),
            stats,
        }
    }

    /// Sets the longest line the client may send.
    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.parser = LineParser::with_max_line_length(max_line_length);
        self
    }

    /// Runs the main connection loop.
    ///
    /// Returns `Ok(())` when the client sends QUIT; an EOF or I/O failure ends
    /// the loop with an error.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    info!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(frame) = self.next_frame() {
                let reply = match frame {
                    Frame::Blank => continue,
                    Frame::Invalid(e) => {
                        debug!(client = %self.addr, error = %e, "Protocol error");
                        self.stats.protocol_error();
                        Reply::error(e.to_string())
                    }
                    Frame::Command(Command::Quit) => {
                        let reply = self.command_handler.execute(Command::Quit).await;
                        self.send_reply(&reply).await?;
                        return Ok(());
                    }
                    Frame::Command(command) => self.command_handler.execute(command).await,
                };

                self.send_reply(&reply).await?;
            }

            self.read_more_data().await?;
        }
    }

    /// Takes the next frame off the buffer, if a complete one is there.
    fn next_frame(&mut self) -> Option<Frame> {
        let (frame, consumed) = self.parser.parse(&self.buffer)?;
        let _ = self.buffer.split_to(consumed);
        trace!(
            client = %self.addr,
            consumed = consumed,
            remaining = self.buffer.len(),
            "Parsed frame"
        );
        Some(frame)
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        // Ensure we have some capacity
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                // Unterminated last line is dropped
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Sends a reply line to the client.
    async fn send_reply(&mut self, reply: &Reply) -> Result<(), ConnectionError> {
        let bytes = reply.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent reply"
        );
        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Client disconnected between commands
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Client disconnected in the middle of a line
    #[error("Unexpected end of stream")]
    UnexpectedEof,
}

/// Handles a client connection.
///
/// Creates a [`ConnectionHandler`] and runs it to completion.
///
/// # Arguments
///
/// * `stream` - The client stream
/// * `addr` - The client's socket address
/// * `command_handler` - The command handler for executing commands
/// * `stats` - Shared connection statistics
/// * `max_line_length` - Longest accepted command line
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    max_line_length: usize,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats)
        .with_max_line_length(max_line_length);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::PersistenceManager;
    use crate::protocol::DEFAULT_MAX_LINE_LENGTH;
    use crate::storage::StorageEngine;
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_test::io::Builder;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:9".parse().unwrap()
    }

    fn create_handler() -> (TempDir, CommandHandler, Arc<ConnectionStats>) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageEngine::new());
        let persistence = Arc::new(PersistenceManager::new(
            Arc::clone(&storage),
            dir.path().join("dump.json"),
        ));
        let stats = Arc::new(ConnectionStats::new());
        let handler = CommandHandler::new(storage, persistence, Arc::clone(&stats));
        (dir, handler, stats)
    }

    #[tokio::test]
    async fn test_pipelined_commands_answered_in_order() {
        let (_dir, handler, stats) = create_handler();
        let mock = Builder::new()
            .read(b"SET k1 v1\nSET k2 v2\nGET k1\nGET k2\n")
            .write(b"OK\n")
            .write(b"OK\n")
            .write(b"v1\n")
            .write(b"v2\n")
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), handler, Arc::clone(&stats))
            .run()
            .await;

        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 4);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_line_split_across_reads() {
        let (_dir, handler, stats) = create_handler();
        let mock = Builder::new()
            .read(b"SET na")
            .read(b"me Ariz\r")
            .read(b"\nGET name\r\n")
            .write(b"OK\n")
            .write(b"Ariz\n")
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), handler, stats)
            .run()
            .await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
    }

    #[tokio::test]
    async fn test_quit_closes_connection() {
        let (_dir, handler, stats) = create_handler();
        let mock = Builder::new()
            .read(b"PING\nQUIT\nGET never_answered\n")
            .write(b"PONG\n")
            .write(b"BYE\n")
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), handler, stats)
            .run()
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_bad_lines_keep_connection_usable() {
        let (_dir, handler, stats) = create_handler();
        let mock = Builder::new()
            .read(b"\n   \nFROB x\nGET\nSET k v soon\nGET \xff\nSET k v\nGET k\n")
            .write(b"ERROR: unknown command 'FROB'\n")
            .write(b"ERROR: wrong number of arguments for 'GET' command\n")
            .write(b"ERROR: value is not an integer\n")
            .write(b"ERROR: invalid UTF-8 in command\n")
            .write(b"OK\n")
            .write(b"v\n")
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), handler, Arc::clone(&stats))
            .run()
            .await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
        assert_eq!(stats.protocol_errors.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn test_line_too_long_then_recovers() {
        let (_dir, handler, stats) = create_handler();
        let mock = Builder::new()
            .read(b"SET key 0123456789")
            .write(b"ERROR: line too long (18 bytes, max 16)\n")
            .read(b"0123456789\nGET key\n")
            .write(b"Key not found\n")
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), handler, stats)
            .with_max_line_length(16)
            .run()
            .await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
    }

    #[tokio::test]
    async fn test_eof_mid_line() {
        let (_dir, handler, stats) = create_handler();
        let mock = Builder::new().read(b"GET k").build();

        let result = ConnectionHandler::new(mock, test_addr(), handler, stats)
            .run()
            .await;
        assert!(matches!(result, Err(ConnectionError::UnexpectedEof)));
    }

    async fn create_test_server() -> (SocketAddr, TempDir, Arc<ConnectionStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (dir, handler, stats) = create_handler();

        let stats_clone = Arc::clone(&stats);
        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let handler = handler.clone();
                let stats = Arc::clone(&stats_clone);
                tokio::spawn(handle_connection(
                    stream,
                    client_addr,
                    handler,
                    stats,
                    DEFAULT_MAX_LINE_LENGTH,
                ));
            }
        });

        (addr, dir, stats)
    }

    #[tokio::test]
    async fn test_set_get_over_tcp() {
        let (addr, _dir, _) = create_test_server().await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        write_half.write_all(b"SET name Ariz\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "OK");

        write_half.write_all(b"GET name\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "Ariz");
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (addr, _dir, stats) = create_test_server().await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let stream = TcpStream::connect(addr).await.unwrap();

        // Give the server time to accept the connection
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        write_half.write_all(b"PING\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "PONG");

        assert!(stats.commands_processed.load(Ordering::Relaxed) >= 1);
        assert!(stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert!(stats.bytes_written.load(Ordering::Relaxed) > 0);

        drop(write_half);
        drop(lines);

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }
}
