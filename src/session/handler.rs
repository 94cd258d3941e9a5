//! Session Handler
//!
//! This module serves one client connection. A session runs two stages that
//! are connected by a relay holding at most one encoded reply.
//!
//! ## Session Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. Session created, stream split into read/write halves
//!        │
//!        ├──────────────────────────────┐
//!        ▼                              ▼
//! 3. Inbound stage                   Outbound stage (spawned)
//!    ┌──────────────────────────┐    ┌──────────────────────────┐
//!    │ Read line up to '\n'     │    │ Receive reply from relay │
//!    │ Parse + execute          │    │ Write + flush            │
//!    │ Send reply on relay ─────┼───>│                          │
//!    │ [Loop back]              │    │ [Loop back]              │
//!    └──────────────────────────┘    └──────────────────────────┘
//!        │                              │
//!        ▼                              ▼
//! 4. EOF / read error: relay      Write error: relay closed,
//!    closed, outbound drains         inbound stops reading
//!        │                              │
//!        └──────────────┬───────────────┘
//!                       ▼
//! 5. Write half shut down, session ends
//! ```
//!
//! ## Backpressure
//!
//! The relay has a single slot. When the client stops reading replies, the
//! outbound stage blocks on the socket, the slot fills, and the inbound stage
//! stops taking new commands from this client. Other sessions are unaffected.

use crate::commands::CommandHandler;
use crate::protocol::Reply;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{debug, error, info, trace, warn};

/// Longest accepted command line, terminator excluded (1 MiB)
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Initial capacity of the line buffer
const INITIAL_LINE_CAPACITY: usize = 256;

/// Capacity of the relay between the two stages
const RELAY_CAPACITY: usize = 1;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
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

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that end a session.
///
/// None of these affect other sessions or the store.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A command line did not fit the line limit
    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    /// The outbound task panicked or was cancelled
    #[error("outbound task failed: {0}")]
    Join(#[from] JoinError),
}

/// A single client session.
///
/// Generic over the stream so it can be driven by a `TcpStream` in production
/// and by in-memory streams in tests.
pub struct Session<S> {
    /// Session id, unique for the lifetime of the process
    id: u64,

    /// The client stream
    stream: S,

    /// The command handler (shared across sessions)
    command_handler: CommandHandler,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Creates a new session.
    ///
    /// # Arguments
    ///
    /// * `stream` - The client stream
    /// * `command_handler` - The command handler for executing commands
    /// * `stats` - Shared connection statistics
    pub fn new(stream: S, command_handler: CommandHandler, stats: Arc<ConnectionStats>) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            stream,
            command_handler,
            stats,
        }
    }

    /// Returns the session id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Runs the session until the client disconnects or an error occurs.
    ///
    /// The outbound stage runs as its own task; the inbound stage runs on the
    /// calling task. Both have finished when this returns.
    pub async fn run(self) -> Result<(), SessionError> {
        let Session {
            id,
            stream,
            command_handler,
            stats,
        } = self;

        stats.connection_opened();
        let (reader, writer) = tokio::io::split(stream);
        let (relay, replies) = mpsc::channel(RELAY_CAPACITY);

        let writer_task = tokio::spawn(outbound(id, writer, replies, Arc::clone(&stats)));
        let read_result =
            inbound(id, BufReader::new(reader), &command_handler, relay, &stats).await;
        let write_result = writer_task.await;

        stats.connection_closed();

        // A write failure is the root cause when both stages fail.
        write_result??;
        read_result
    }
}

/// Reads lines, executes them, and hands the encoded replies to the relay.
async fn inbound<R>(
    id: u64,
    mut reader: R,
    command_handler: &CommandHandler,
    relay: mpsc::Sender<Bytes>,
    stats: &ConnectionStats,
) -> Result<(), SessionError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::with_capacity(INITIAL_LINE_CAPACITY);

    loop {
        line.clear();

        // Room for the longest line plus its CRLF terminator.
        let mut limited = (&mut reader).take(MAX_LINE_LENGTH as u64 + 2);
        let n = tokio::select! {
            read = limited.read_until(b'\n', &mut line) => read?,
            _ = relay.closed() => {
                debug!(session = id, "Outbound stage gone, stopping reads");
                return Ok(());
            }
        };

        if n == 0 {
            trace!(session = id, "End of stream");
            return Ok(());
        }
        stats.bytes_read(n);

        let command = trim_terminator(&line);
        if command.len() > MAX_LINE_LENGTH {
            let err = SessionError::LineTooLong {
                limit: MAX_LINE_LENGTH,
            };
            warn!(session = id, error = %err, "Rejecting oversized line");
            let _ = relay.send(Reply::error(&err).serialize()).await;
            return Err(err);
        }

        let reply = command_handler.execute(command);
        stats.command_processed();
        trace!(session = id, reply = %reply, "Executed command");

        if relay.send(reply.serialize()).await.is_err() {
            debug!(session = id, "Outbound stage gone, dropping reply");
            return Ok(());
        }
    }
}

/// Writes replies in relay order until the relay closes or a write fails.
async fn outbound<W>(
    id: u64,
    mut writer: W,
    mut replies: mpsc::Receiver<Bytes>,
    stats: Arc<ConnectionStats>,
) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(reply) = replies.recv().await {
        if let Err(e) = send_reply(&mut writer, &reply).await {
            error!(session = id, error = %e, "Failed to write reply");
            // Closing the relay releases the inbound stage.
            drop(replies);
            let _ = writer.shutdown().await;
            return Err(e.into());
        }

        stats.bytes_written(reply.len());
        trace!(session = id, bytes = reply.len(), "Sent reply");
    }

    if let Err(e) = writer.shutdown().await {
        debug!(session = id, error = %e, "Shutdown after last reply failed");
    }
    Ok(())
}

async fn send_reply<W>(writer: &mut W, reply: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(reply).await?;
    writer.flush().await
}

/// Strips a trailing `\n` or `\r\n`.
fn trim_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Handles a client connection.
///
/// This is a convenience function that creates a Session and runs it to
/// completion, logging how it ended.
///
/// # Arguments
///
/// * `stream` - The TCP stream for this connection
/// * `addr` - The client's socket address
/// * `command_handler` - The command handler for executing commands
/// * `stats` - Shared connection statistics
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) {
    let session = Session::new(stream, command_handler, stats);
    let id = session.id();
    info!(session = id, client = %addr, "Client connected");

    match session.run().await {
        Ok(()) => info!(session = id, client = %addr, "Client disconnected"),
        Err(SessionError::Io(ref e)) if e.kind() == std::io::ErrorKind::ConnectionReset => {
            debug!(session = id, client = %addr, "Connection reset by client")
        }
        Err(e) => warn!(session = id, client = %addr, error = %e, "Session ended with error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;
    use std::io;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    fn create_handler() -> (CommandHandler, Arc<Store>) {
        let store = Arc::new(Store::new());
        (CommandHandler::new(Arc::clone(&store)), store)
    }

    async fn read_exactly<R: AsyncRead + Unpin>(reader: &mut R, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        tokio::time::timeout(Duration::from_secs(2), reader.read_exact(&mut buf))
            .await
            .expect("timed out waiting for replies")
            .unwrap();
        buf
    }

    #[test]
    fn test_trim_terminator() {
        assert_eq!(trim_terminator(b"GET a\r\n"), b"GET a");
        assert_eq!(trim_terminator(b"GET a\n"), b"GET a");
        assert_eq!(trim_terminator(b"GET a"), b"GET a");
        assert_eq!(trim_terminator(b"\r\n"), b"");
    }

    #[tokio::test]
    async fn test_mock_get_missing() {
        let (handler, _) = create_handler();
        let stats = Arc::new(ConnectionStats::new());

        let mock = tokio_test::io::Builder::new()
            .read(b"GET missing\r\n")
            .write(b"_\r\n")
            .build();

        Session::new(mock, handler, Arc::clone(&stats))
            .run()
            .await
            .unwrap();

        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_partial_last_line_is_processed() {
        let (handler, store) = create_handler();
        let stats = Arc::new(ConnectionStats::new());
        let (client, server) = duplex(1024);
        let (mut client_reader, mut client_writer) = tokio::io::split(client);

        let session = tokio::spawn(Session::new(server, handler, stats).run());

        client_writer.write_all(b"SET a 1\r\nINC").await.unwrap();
        client_writer.write_all(b"R a").await.unwrap();
        client_writer.shutdown().await.unwrap();

        let expected = b"+OK\r\n+OK\r\n";
        assert_eq!(
            read_exactly(&mut client_reader, expected.len()).await,
            expected
        );
        session.await.unwrap().unwrap();

        assert_eq!(store.get("a").unwrap().0, Bytes::from("2"));
    }

    #[tokio::test]
    async fn test_write_failure_ends_session() {
        let (handler, _) = create_handler();
        let stats = Arc::new(ConnectionStats::new());

        let mock = tokio_test::io::Builder::new()
            .read(b"GET a\r\n")
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            .build();

        let result = Session::new(mock, handler, Arc::clone(&stats)).run().await;

        match result {
            Err(SessionError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("expected write error, got {:?}", other),
        }
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_write_failure_releases_pending_read() {
        let (handler, _) = create_handler();
        let stats = Arc::new(ConnectionStats::new());

        // The client sends one command and then keeps the connection open
        // without sending anything else.
        let mock = tokio_test::io::Builder::new()
            .read(b"GET a\r\n")
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            .wait(Duration::from_secs(3600))
            .build();

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            Session::new(mock, handler, stats).run(),
        )
        .await
        .expect("session did not end after write failure");

        assert!(matches!(result, Err(SessionError::Io(_))));
    }

    #[tokio::test]
    async fn test_duplex_set_get() {
        let (handler, _) = create_handler();
        let stats = Arc::new(ConnectionStats::new());
        let (mut client, server) = duplex(1024);

        let session = tokio::spawn(Session::new(server, handler, Arc::clone(&stats)).run());

        client.write_all(b"SET foo bar\r\nGET foo\r\n").await.unwrap();
        let expected = b"+OK\r\n$3\r\nbar\r\n";
        assert_eq!(read_exactly(&mut client, expected.len()).await, expected);

        drop(client);
        session.await.unwrap().unwrap();

        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 2);
        assert!(stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert_eq!(
            stats.bytes_written.load(Ordering::Relaxed),
            expected.len() as u64
        );
    }

    #[tokio::test]
    async fn test_duplex_errors_keep_session_alive() {
        let (handler, _) = create_handler();
        let stats = Arc::new(ConnectionStats::new());
        let (mut client, server) = duplex(1024);

        tokio::spawn(Session::new(server, handler, stats).run());

        client
            .write_all(b"\r\nBOGUS\r\nSET k v NX XX\r\nINCR nope\r\nSET k v\r\n")
            .await
            .unwrap();

        let expected: &[u8] = b"-ERR no command supplied\r\n\
            -ERR unknown command 'BOGUS'\r\n\
            -ERR conflicting flags NX/XX\r\n\
            -ERR key not found\r\n\
            +OK\r\n";
        assert_eq!(read_exactly(&mut client, expected.len()).await, expected);
    }

    #[tokio::test]
    async fn test_duplex_replies_in_order() {
        let (handler, store) = create_handler();
        let stats = Arc::new(ConnectionStats::new());
        let (client, server) = duplex(64);
        let (mut client_reader, mut client_writer) = tokio::io::split(client);

        tokio::spawn(Session::new(server, handler, stats).run());

        // Writing 200 command pairs through a small pipe only completes if
        // replies keep draining on the other side.
        let writer = tokio::spawn(async move {
            for i in 0..200 {
                let pair = format!("SET k {}\nGET k\n", i);
                client_writer.write_all(pair.as_bytes()).await.unwrap();
            }
            client_writer
        });

        let mut expected = Vec::new();
        for i in 0..200 {
            let value = i.to_string();
            expected.extend_from_slice(
                format!("+OK\r\n${}\r\n{}\r\n", value.len(), value).as_bytes(),
            );
        }
        assert_eq!(
            read_exactly(&mut client_reader, expected.len()).await,
            expected
        );

        writer.await.unwrap();
        assert_eq!(store.get("k").unwrap().0, Bytes::from("199"));
    }

    #[tokio::test]
    async fn test_line_too_long() {
        let (handler, _) = create_handler();
        let stats = Arc::new(ConnectionStats::new());
        let (client, server) = duplex(64 * 1024);
        let (mut client_reader, mut client_writer) = tokio::io::split(client);

        let session = tokio::spawn(Session::new(server, handler, stats).run());

        tokio::spawn(async move {
            let chunk = vec![b'a'; 64 * 1024];
            for _ in 0..20 {
                if client_writer.write_all(&chunk).await.is_err() {
                    break;
                }
            }
        });

        let expected = format!("-ERR line exceeds {} bytes\r\n", MAX_LINE_LENGTH);
        assert_eq!(
            read_exactly(&mut client_reader, expected.len()).await,
            expected.as_bytes()
        );

        let result = session.await.unwrap();
        assert!(matches!(
            result,
            Err(SessionError::LineTooLong {
                limit: MAX_LINE_LENGTH
            })
        ));
    }

    #[tokio::test]
    async fn test_session_ids_are_unique() {
        let (handler, _) = create_handler();
        let stats = Arc::new(ConnectionStats::new());
        let (_client_a, server_a) = duplex(64);
        let (_client_b, server_b) = duplex(64);

        let a = Session::new(server_a, handler.clone(), Arc::clone(&stats));
        let b = Session::new(server_b, handler, Arc::clone(&stats));
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_unrun_session_is_not_counted() {
        let (handler, _) = create_handler();
        let stats = Arc::new(ConnectionStats::new());
        let (_idle_client, idle_server) = duplex(64);

        let idle = Session::new(idle_server, handler.clone(), Arc::clone(&stats));
        drop(idle);
        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 0);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        // A client that hangs up at once still counts as one connection
        let (client, server) = duplex(64);
        drop(client);
        Session::new(server, handler, Arc::clone(&stats)).run().await.unwrap();
        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }
}
