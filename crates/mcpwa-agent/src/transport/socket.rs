use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    detach, read_lines, write_line, Attached, ConnectionId, EventSink, ReadEnd, Transport,
    TransportEvent, TransportKind, WriterSlot,
};
use crate::errors::TransportError;

/// Unix domain socket listener serving one client at a time.
///
/// A connection attempt while a client is attached is closed right away; the attached client
/// is not affected. When the client leaves, the next connection is accepted and gets a new
/// [`ConnectionId`], so replies to the previous client can never reach it.
pub struct SocketTransport {
    path: PathBuf,
    shared: Arc<Shared>,
    running: StdMutex<Option<Running>>,
}

struct Shared {
    writer: WriterSlot<OwnedWriteHalf>,
    connected: AtomicBool,
    next_conn: AtomicU64,
}

struct Running {
    cancel: CancellationToken,
    accept_loop: JoinHandle<()>,
}

impl SocketTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            shared: Arc::new(Shared {
                writer: Mutex::new(None),
                connected: AtomicBool::new(false),
                next_conn: AtomicU64::new(1),
            }),
            running: StdMutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Bind `path`, clearing a socket file left behind by a process that is gone.
///
/// A file that still accepts connections belongs to a live server and is left alone.
async fn bind_with_recovery(path: &Path) -> Result<UnixListener, TransportError> {
    match UnixListener::bind(path) {
        Ok(listener) => return Ok(listener),
        Err(e) if e.kind() == ErrorKind::AddrInUse => {}
        Err(source) => {
            return Err(TransportError::Bind {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    if UnixStream::connect(path).await.is_ok() {
        return Err(TransportError::AddressInUse(path.to_path_buf()));
    }
    info!(path = %path.display(), "removing stale socket file");
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            return Err(TransportError::Bind {
                path: path.to_path_buf(),
                source: e,
            });
        }
    }
    UnixListener::bind(path).map_err(|source| TransportError::Bind {
        path: path.to_path_buf(),
        source,
    })
}

async fn accept_loop(
    listener: UnixListener,
    shared: Arc<Shared>,
    events: EventSink,
    cancel: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        let stream = match accepted {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!(error = %e, "accept failed");
                let _ = events.send(TransportEvent::Log(format!("accept failed: {e}")));
                continue;
            }
        };

        if shared.connected.load(Ordering::SeqCst) {
            debug!("rejecting second client");
            let _ = events.send(TransportEvent::Log(
                "rejected a connection: a client is already attached".to_string(),
            ));
            drop(stream);
            continue;
        }

        let conn = shared.next_conn.fetch_add(1, Ordering::SeqCst);
        let (read_half, write_half) = stream.into_split();
        *shared.writer.lock().await = Some(Attached::new(conn, write_half));
        shared.connected.store(true, Ordering::SeqCst);
        info!(conn, "client connected");
        let _ = events.send(TransportEvent::Connected);

        let shared = shared.clone();
        let events = events.clone();
        let cancel = cancel.child_token();
        tokio::spawn(async move {
            let end = read_lines(read_half, conn, &events, &cancel).await;
            drop(detach(&shared.writer, conn).await);
            shared.connected.store(false, Ordering::SeqCst);
            if end == ReadEnd::Closed {
                info!(conn, "client disconnected");
                let _ = events.send(TransportEvent::Disconnected);
            }
        });
    }
}

#[async_trait]
impl Transport for SocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    async fn start(&self, events: EventSink) -> Result<(), TransportError> {
        if self.running.lock().map(|r| r.is_some()).unwrap_or(false) {
            return Err(TransportError::AlreadyStarted);
        }
        let listener = bind_with_recovery(&self.path).await?;
        info!(path = %self.path.display(), "listening");

        let cancel = CancellationToken::new();
        let accept_loop = tokio::spawn(accept_loop(
            listener,
            self.shared.clone(),
            events,
            cancel.clone(),
        ));
        if let Ok(mut running) = self.running.lock() {
            *running = Some(Running {
                cancel,
                accept_loop,
            });
        }
        Ok(())
    }

    async fn stop(&self) {
        let running = self.running.lock().ok().and_then(|mut r| r.take());
        let Some(running) = running else {
            return;
        };
        running.cancel.cancel();
        let _ = running.accept_loop.await;
        if let Some(mut attached) = self.shared.writer.lock().await.take() {
            let _ = attached.writer.shutdown().await;
        }
        self.shared.connected.store(false, Ordering::SeqCst);
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "could not remove socket file");
            }
        }
        debug!("socket transport stopped");
    }

    async fn send_line(&self, conn: ConnectionId, line: &str) -> Result<(), TransportError> {
        write_line(&self.shared.writer, conn, line).await
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}
