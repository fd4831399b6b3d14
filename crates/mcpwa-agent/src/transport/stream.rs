use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
    read_lines, write_line, Attached, BoxedReader, BoxedWriter, ConnectionId, EventSink, ReadEnd,
    Transport, TransportEvent, TransportKind, WriterSlot,
};
use crate::errors::TransportError;

/// The single peer of a stream transport.
pub const STREAM_CONNECTION: ConnectionId = 1;

/// Duplex over a reader and a writer, normally the process's standard input and output.
///
/// There is exactly one peer. End of input reports `Disconnected` and the transport does not
/// reconnect, but the output stays open until `stop` so requests already read still get
/// their replies.
pub struct StreamTransport {
    reader: StdMutex<Option<BoxedReader>>,
    writer: WriterSlot<BoxedWriter>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: StdMutex<Option<JoinHandle<()>>>,
}

impl StreamTransport {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: StdMutex::new(Some(Box::new(reader))),
            writer: Mutex::new(Some(Attached::new(
                STREAM_CONNECTION,
                Box::new(writer) as BoxedWriter,
            ))),
            connected: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            task: StdMutex::new(None),
        }
    }

    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

#[async_trait]
impl Transport for StreamTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn start(&self, events: EventSink) -> Result<(), TransportError> {
        let reader = match self.reader.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(reader) = reader else {
            return Err(TransportError::AlreadyStarted);
        };

        self.connected.store(true, Ordering::SeqCst);
        let connected = self.connected.clone();
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let _ = events.send(TransportEvent::Connected);
            let end = read_lines(reader, STREAM_CONNECTION, &events, &cancel).await;
            connected.store(false, Ordering::SeqCst);
            if end == ReadEnd::Closed {
                info!("input stream closed");
                let _ = events.send(TransportEvent::Disconnected);
            }
        });
        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }
        debug!("stream transport started");
        Ok(())
    }

    async fn stop(&self) {
        self.cancel.cancel();
        self.connected.store(false, Ordering::SeqCst);
        let task = self.task.lock().ok().and_then(|mut t| t.take());
        if let Some(task) = task {
            let _ = task.await;
        }
        if let Some(mut attached) = self.writer.lock().await.take() {
            let _ = attached.writer.shutdown().await;
        }
        debug!("stream transport stopped");
    }

    async fn send_line(&self, conn: ConnectionId, line: &str) -> Result<(), TransportError> {
        write_line(&self.writer, conn, line).await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
