//! Connection Handler
//!
//! Each client gets its own handler task that runs in a loop, reading
//! commands and sending replies until the peer goes away.
//!
//! ## Connection Lifecycle
//!
//! ```text
//!   Open ──read──> Decoding ──> Dispatching ──> Replying ──┐
//!    ▲                │                                    │
//!    │                └─ incomplete: read more ────────────┤
//!    └─────────────────────────────────────────────────────┘
//!
//!   EOF / I/O error ──> Closed
//! ```
//!
//! ## Buffer Management
//!
//! TCP is a byte stream: one read may carry half a command, or several.
//! Incoming bytes accumulate in a `BytesMut`; every complete command at the
//! front of the buffer is executed in arrival order, and whatever remains
//! waits for the next read.
//!
//! Bytes that can never form a valid request get one protocol-error reply,
//! are discarded, and the connection stays open.

use crate::commands::CommandHandler;
use crate::protocol::{Command, ParseError, RespParser, RespValue};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, trace, warn};

/// Default cap on buffered, not-yet-decoded input: the largest bulk
/// payload plus room for its headers.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = crate::protocol::parser::MAX_BULK_SIZE + 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Requests rejected as undecodable
    pub protocol_errors: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
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
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// What the front of the buffer holds.
enum Decoded {
    Command(Command),
    Malformed(ParseError),
    Incomplete,
}

/// Handles a single client connection.
///
/// Generic over the stream so the same loop drives TCP sockets in
/// production and in-memory mocks in tests.
pub struct ConnectionHandler<S> {
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Bytes read but not yet decoded
    buffer: BytesMut,

    max_buffer_size: usize,

    command_handler: CommandHandler,

    parser: RespParser,

    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
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
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            command_handler,
            parser: RespParser::new(),
            stats,
        }
    }

    /// Overrides the cap on buffered input.
    pub fn with_max_buffer_size(mut self, max: usize) -> Self {
        self.max_buffer_size = max;
        self
    }

    /// Runs the connection loop until the client disconnects or an error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            loop {
                let reply = match self.next_request() {
                    Decoded::Command(command) => {
                        self.stats.command_processed();
                        self.command_handler.execute(command)
                    }
                    Decoded::Malformed(e) => {
                        self.stats.protocol_error();
                        self.command_handler.reject(&e)
                    }
                    Decoded::Incomplete => break,
                };
                self.write_reply(&reply).await?;
            }

            // Replies for everything decoded from one read go out together
            self.stream.flush().await?;

            if !self.read_more_data().await? {
                return Ok(());
            }
        }
    }

    /// Takes the next request off the front of the buffer.
    fn next_request(&mut self) -> Decoded {
        if self.buffer.is_empty() {
            return Decoded::Incomplete;
        }

        match self.parser.parse(&self.buffer) {
            Ok(Some((frame, consumed))) => {
                self.buffer.advance(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed frame"
                );
                // A well-formed frame that is not a command only costs itself
                match Command::from_frame(frame) {
                    Ok(command) => Decoded::Command(command),
                    Err(e) => {
                        warn!(client = %self.addr, error = %e, "Invalid request");
                        Decoded::Malformed(e)
                    }
                }
            }
            Ok(None) => {
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete command, need more data"
                );
                Decoded::Incomplete
            }
            Err(e) => {
                // No way to find the next frame boundary inside broken bytes
                warn!(
                    client = %self.addr,
                    error = %e,
                    discarded = self.buffer.len(),
                    "Protocol error"
                );
                self.buffer.clear();
                Decoded::Malformed(e)
            }
        }
    }

    /// Reads more data from the stream into the buffer.
    ///
    /// Returns `false` on a clean end of stream.
    async fn read_more_data(&mut self) -> Result<bool, ConnectionError> {
        if self.buffer.len() >= self.max_buffer_size {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            return if self.buffer.is_empty() {
                Ok(false)
            } else {
                Err(ConnectionError::UnexpectedEof)
            };
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(true)
    }

    /// Writes a reply into the outgoing buffer.
    async fn write_reply(&mut self, reply: &RespValue) -> Result<(), ConnectionError> {
        let bytes = reply.serialize();
        self.stream.write_all(&bytes).await?;
        self.stats.bytes_written(bytes.len());
        trace!(client = %self.addr, bytes = bytes.len(), "Sent reply");
        Ok(())
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Peer closed the stream in the middle of a command
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Runs a client connection to completion.
///
/// # Arguments
///
/// * `stream` - The client's stream (a `TcpStream` in production)
/// * `addr` - The client's socket address
/// * `command_handler` - Executes decoded commands
/// * `stats` - Shared connection statistics
/// * `max_buffer_size` - Cap on buffered, not-yet-decoded input
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    max_buffer_size: usize,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats)
        .with_max_buffer_size(max_buffer_size);
    // run() already logged how the connection ended
    let _ = handler.run().await;
}
