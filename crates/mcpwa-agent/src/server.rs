//! The protocol gateway.
//!
//! [`GatewayServer`] owns one transport at a time. Its pump task turns transport events into
//! state changes and decodes every received line in arrival order, queueing the tool's job
//! before reading the next line. Waiting for the result and writing the reply happen on a
//! tracked task per request, so replies can finish out of order; each reply carries the id
//! of the request it answers and goes back to the connection the request came from.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{self, FutureExt};
use mcpwa::WhatsApp;
use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::FilterVocabulary;
use crate::errors::{StartError, ToolError, TransportError};
use crate::logging::{LogLevel, LogSink, TracingLogSink};
use crate::protocol::{decode_request, encode_reply, DecodeError, RequestId, ToolReply};
use crate::tools::{prepare, ToolContext, ToolFuture};
use crate::transport::{ConnectionId, Transport, TransportEvent, TransportFactory, TransportKind};
use crate::worker::AutomationQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Stopped => "stopped",
            Phase::Starting => "starting",
            Phase::Running => "running",
            Phase::Stopping => "stopping",
        })
    }
}

/// What `status` reports about the gateway itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerState {
    pub running: bool,
    pub transport_connected: bool,
}

pub struct ServerOptions {
    pub vocabulary: FilterVocabulary,
    pub log_sink: Arc<dyn LogSink>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            vocabulary: FilterVocabulary::default(),
            log_sink: Arc::new(TracingLogSink),
        }
    }
}

/// A started transport plus everything tied to its lifetime.
struct Session {
    transport: Arc<dyn Transport>,
    queue: Arc<AutomationQueue>,
    cancel: CancellationToken,
    pump: JoinHandle<()>,
    /// One task per request awaiting its reply.
    replies: TaskTracker,
}

struct Inner {
    whatsapp: Arc<WhatsApp>,
    factory: TransportFactory,
    vocabulary: Arc<FilterVocabulary>,
    log_sink: Arc<dyn LogSink>,
    phase: watch::Sender<Phase>,
    connected: AtomicBool,
    session: Mutex<Option<Session>>,
}

#[derive(Clone)]
pub struct GatewayServer {
    inner: Arc<Inner>,
}

impl GatewayServer {
    pub fn new(whatsapp: WhatsApp, factory: TransportFactory, options: ServerOptions) -> Self {
        let (phase, _) = watch::channel(Phase::Stopped);
        Self {
            inner: Arc::new(Inner {
                whatsapp: Arc::new(whatsapp),
                factory,
                vocabulary: Arc::new(options.vocabulary),
                log_sink: options.log_sink,
                phase,
                connected: AtomicBool::new(false),
                session: Mutex::new(None),
            }),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.inner.phase.borrow()
    }

    pub fn state(&self) -> ServerState {
        self.inner.state()
    }

    /// Build a transport, start it, and begin serving. A no-op when already running.
    ///
    /// Transport failures are returned as they are; nothing is retried here.
    pub async fn start(&self) -> Result<(), StartError> {
        let mut session = self.inner.session.lock().await;
        if session.is_some() {
            debug!("start requested while running");
            return Ok(());
        }
        self.inner.set_phase(Phase::Starting);

        match self.open_session().await {
            Ok(opened) => {
                let kind = opened.transport.kind();
                *session = Some(opened);
                self.inner.set_phase(Phase::Running);
                self.inner
                    .log(LogLevel::Info, &format!("gateway running on {kind} transport"));
                Ok(())
            }
            Err(e) => {
                self.inner.set_phase(Phase::Stopped);
                self.inner
                    .log(LogLevel::Error, &format!("gateway failed to start: {e}"));
                Err(e)
            }
        }
    }

    async fn open_session(&self) -> Result<Session, StartError> {
        let transport = (self.inner.factory)()?;
        let queue = Arc::new(
            AutomationQueue::spawn(self.inner.whatsapp.clone()).map_err(StartError::Worker)?,
        );
        let (events, receiver) = mpsc::unbounded_channel();
        // On failure the queue is dropped here, which shuts its worker down.
        transport.start(events).await?;

        let cancel = CancellationToken::new();
        let replies = TaskTracker::new();
        let pump = tokio::spawn(pump(
            self.clone(),
            transport.clone(),
            queue.clone(),
            receiver,
            cancel.clone(),
            replies.clone(),
        ));
        Ok(Session {
            transport,
            queue,
            cancel,
            pump,
            replies,
        })
    }

    /// Stop serving. Lines that arrive from now on are not dispatched; the call running on
    /// the worker finishes, later queued ones are refused. Every accepted request is answered
    /// before the transport closes.
    pub async fn stop(&self) {
        let mut session = self.inner.session.lock().await;
        let Some(active) = session.take() else {
            return;
        };
        self.inner.set_phase(Phase::Stopping);
        active.cancel.cancel();
        // The pump only waits on channels and exits once cancelled.
        if let Err(e) = active.pump.await {
            warn!(error = %e, "event pump ended abnormally");
        }
        active.replies.close();
        active.queue.shutdown();
        active.replies.wait().await;
        active.transport.stop().await;
        self.inner.connected.store(false, Ordering::SeqCst);
        self.inner.set_phase(Phase::Stopped);
        self.inner.log(LogLevel::Info, "gateway stopped");
    }

    /// Resolve once the server is in [`Phase::Stopped`].
    pub async fn wait_stopped(&self) {
        let mut phase = self.inner.phase.subscribe();
        let _ = phase.wait_for(|p| *p == Phase::Stopped).await;
    }
}

impl Inner {
    fn set_phase(&self, phase: Phase) {
        debug!(%phase, "gateway phase");
        self.phase.send_replace(phase);
    }

    fn state(&self) -> ServerState {
        ServerState {
            running: *self.phase.borrow() == Phase::Running,
            transport_connected: self.connected.load(Ordering::SeqCst),
        }
    }

    fn log(&self, level: LogLevel, message: &str) {
        self.log_sink.on_log(message, level);
    }
}

async fn pump(
    server: GatewayServer,
    transport: Arc<dyn Transport>,
    queue: Arc<AutomationQueue>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    cancel: CancellationToken,
    replies: TaskTracker,
) {
    let inner = &server.inner;
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        let Some(event) = event else {
            break;
        };
        match event {
            TransportEvent::Connected => {
                inner.connected.store(true, Ordering::SeqCst);
                inner.log(LogLevel::Info, "client connected");
            }
            TransportEvent::Disconnected => {
                inner.connected.store(false, Ordering::SeqCst);
                inner.log(LogLevel::Info, "client disconnected");
                if transport.kind() == TransportKind::Stdio {
                    // The stream peer never comes back. Answer what was already read, then
                    // stop from a separate task: stop waits for this pump to finish.
                    let server = server.clone();
                    let replies = replies.clone();
                    tokio::spawn(async move {
                        replies.close();
                        replies.wait().await;
                        server.stop().await;
                    });
                    break;
                }
            }
            TransportEvent::Log(text) => inner.log(LogLevel::Debug, &text),
            TransportEvent::LineReceived { conn, line } => {
                let ctx = ToolContext {
                    queue: queue.clone(),
                    vocabulary: inner.vocabulary.clone(),
                    server: inner.state(),
                };
                if let Some(request) = accept_line(&line, &ctx) {
                    replies.spawn(reply(request, conn, transport.clone()));
                }
            }
        }
    }
    debug!("event pump finished");
}

/// A decoded request whose work is already queued.
struct Accepted {
    id: RequestId,
    method: Option<String>,
    work: ToolFuture,
}

/// Decode one request line and queue its tool call.
///
/// Runs on the pump, so jobs reach the worker in the order their lines arrived. A line that
/// cannot be decoded is answered with `malformed-request` when it carries an id and dropped
/// otherwise.
fn accept_line(line: &str, ctx: &ToolContext) -> Option<Accepted> {
    match decode_request(line) {
        Ok(call) => {
            debug!(id = %call.id, method = %call.method, "request");
            let work = match prepare(ctx, &call.method, call.params) {
                Ok(work) => work,
                Err(e) => future::ready(Err(e)).boxed(),
            };
            Some(Accepted {
                id: call.id,
                method: Some(call.method),
                work,
            })
        }
        Err(DecodeError {
            id: Some(id),
            message,
        }) => {
            warn!(%id, %message, "malformed request");
            Some(Accepted {
                id,
                method: None,
                work: future::ready(Err(ToolError::malformed(message))).boxed(),
            })
        }
        Err(DecodeError { id: None, message }) => {
            warn!(%message, "dropping malformed request without an id");
            None
        }
    }
}

/// Wait for one request's result and write its reply to the connection it came from.
async fn reply(request: Accepted, conn: ConnectionId, transport: Arc<dyn Transport>) {
    let Accepted { id, method, work } = request;
    let result = work.await;
    if let (Err(e), Some(method)) = (&result, &method) {
        info!(%id, %method, error = %e, "tool call failed");
    }
    let reply = ToolReply::from_result(id, result);

    let text = match encode_reply(&reply) {
        Ok(text) => text,
        Err(e) => {
            error!(id = %reply.id, error = %e, "failed to encode reply");
            return;
        }
    };
    match transport.send_line(conn, &text).await {
        Ok(()) => {}
        Err(TransportError::ConnectionClosed(_)) => {
            debug!(id = %reply.id, conn, "dropping reply for a departed client");
        }
        Err(e) => warn!(id = %reply.id, error = %e, "failed to send reply"),
    }
}
