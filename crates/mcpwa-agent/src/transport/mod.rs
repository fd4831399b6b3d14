//! Byte transports carrying the line protocol.
//!
//! A transport owns the raw I/O, frames newline-terminated lines, and reports what happens
//! through a [`TransportEvent`] channel registered at [`Transport::start`]. Events are always
//! sent from the transport's own tasks, never from inside `start` or `stop`.
//!
//! Every line is tagged with the [`ConnectionId`] of the client that sent it. A reply is
//! written only while that same client is attached, so a reply outliving its client is
//! dropped instead of reaching whoever connects next.

pub mod codec;
#[cfg(unix)]
pub mod socket;
pub mod stream;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::TransportError;

pub use codec::{Frame, LineCodec, MAX_LINE_LENGTH};
#[cfg(unix)]
pub use socket::SocketTransport;
pub use stream::{StreamTransport, STREAM_CONNECTION};

/// Default listen address of the socket transport.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/mcpwa.sock";

/// Identifies one attached client for the lifetime of a transport.
pub type ConnectionId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    LineReceived { conn: ConnectionId, line: String },
    Log(String),
}

/// Where a transport reports its events.
pub type EventSink = mpsc::UnboundedSender<TransportEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Standard input for requests, standard output for replies. One client for the
    /// lifetime of the process.
    Stdio,
    /// A local socket accepting one client at a time.
    Socket,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Socket => "socket",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stdio" | "stream" => Ok(TransportKind::Stdio),
            "socket" | "unix" => Ok(TransportKind::Socket),
            other => Err(format!(
                "unknown transport '{other}' (expected stdio or socket)"
            )),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Begin I/O. Fails when the underlying channel cannot be opened; nothing is retried
    /// beyond what the transport documents.
    async fn start(&self, events: EventSink) -> Result<(), TransportError>;

    /// End I/O. Calling it on a transport that is not running is a no-op.
    async fn stop(&self);

    /// Write one line to client `conn`. The terminator is appended here.
    ///
    /// Fails with [`TransportError::ConnectionClosed`] once `conn` is no longer the attached
    /// client, and with [`TransportError::NotConnected`] when nobody is attached.
    async fn send_line(&self, conn: ConnectionId, line: &str) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;
}

/// Builds a fresh transport each time the server starts.
pub type TransportFactory =
    Arc<dyn Fn() -> Result<Arc<dyn Transport>, TransportError> + Send + Sync>;

/// Factory for the transport selected on the command line.
pub fn transport_factory(kind: TransportKind, socket_path: PathBuf) -> TransportFactory {
    Arc::new(move || -> Result<Arc<dyn Transport>, TransportError> {
        match kind {
            TransportKind::Stdio => Ok(Arc::new(StreamTransport::stdio())),
            #[cfg(unix)]
            TransportKind::Socket => Ok(Arc::new(SocketTransport::new(socket_path.clone()))),
            #[cfg(not(unix))]
            TransportKind::Socket => Err(TransportError::Unsupported(format!(
                "local sockets are not available on {} ({})",
                std::env::consts::OS,
                socket_path.display()
            ))),
        }
    })
}

pub(crate) type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Why a read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadEnd {
    /// The peer closed its side or the read failed.
    Closed,
    /// The loop was cancelled by `stop`.
    Cancelled,
}

/// Forward complete lines from `reader` until end of input, a read error, or `cancel`.
///
/// Blank lines are skipped. An over-long line is reported and skipped; only an I/O error
/// ends the loop early.
pub(crate) async fn read_lines<R>(
    reader: R,
    conn: ConnectionId,
    events: &EventSink,
    cancel: &CancellationToken,
) -> ReadEnd
where
    R: AsyncRead + Unpin,
{
    let mut frames = FramedRead::new(reader, LineCodec::new());
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ReadEnd::Cancelled,
            next = frames.next() => next,
        };
        match next {
            Some(Ok(Frame::Line(line))) => {
                if line.trim().is_empty() {
                    continue;
                }
                if events
                    .send(TransportEvent::LineReceived { conn, line })
                    .is_err()
                {
                    debug!("event receiver dropped; ending read loop");
                    return ReadEnd::Cancelled;
                }
            }
            Some(Ok(Frame::Oversized(len))) => {
                warn!(conn, len, limit = MAX_LINE_LENGTH, "skipped over-long line");
                let _ = events.send(TransportEvent::Log(format!(
                    "skipped a {len} byte line (limit {MAX_LINE_LENGTH})"
                )));
            }
            Some(Err(e)) => {
                warn!(conn, error = %e, "read failed");
                let _ = events.send(TransportEvent::Log(format!("read failed: {e}")));
                return ReadEnd::Closed;
            }
            None => return ReadEnd::Closed,
        }
    }
}

/// The writing half of the attached client.
pub(crate) struct Attached<W> {
    pub(crate) conn: ConnectionId,
    pub(crate) writer: W,
}

impl<W> Attached<W> {
    pub(crate) fn new(conn: ConnectionId, writer: W) -> Self {
        Self { conn, writer }
    }
}

pub(crate) type WriterSlot<W> = Mutex<Option<Attached<W>>>;

/// Write `line` plus terminator under the writer lock, so concurrent replies never interleave.
pub(crate) async fn write_line<W>(
    slot: &WriterSlot<W>,
    conn: ConnectionId,
    line: &str,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let mut guard = slot.lock().await;
    let Some(attached) = guard.as_mut() else {
        return Err(TransportError::NotConnected);
    };
    if attached.conn != conn {
        return Err(TransportError::ConnectionClosed(conn));
    }
    let writer = &mut attached.writer;
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Detach the writer if it still belongs to `conn`.
pub(crate) async fn detach<W>(slot: &WriterSlot<W>, conn: ConnectionId) -> Option<W> {
    let mut guard = slot.lock().await;
    match guard.as_ref() {
        Some(attached) if attached.conn == conn => guard.take().map(|a| a.writer),
        _ => None,
    }
}
