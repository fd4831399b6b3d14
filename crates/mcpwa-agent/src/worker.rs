//! The single thread that talks to the accessibility API.
//!
//! Cross-process accessibility calls block and must not run concurrently, so every
//! automation operation is queued to one dedicated thread and runs there in arrival order.
//! Callers await a oneshot reply.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use mcpwa::{AutomationError, WhatsApp};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::errors::ToolError;

type Job = Box<dyn FnOnce(&WhatsApp) + Send>;

enum Command {
    Run(Job),
    Shutdown,
}

pub struct AutomationQueue {
    commands: mpsc::UnboundedSender<Command>,
    accepting: Arc<AtomicBool>,
}

impl AutomationQueue {
    /// Start the worker thread. It owns a handle to `whatsapp` until shut down.
    pub fn spawn(whatsapp: Arc<WhatsApp>) -> io::Result<Self> {
        let (commands, mut receiver) = mpsc::unbounded_channel::<Command>();
        let accepting = Arc::new(AtomicBool::new(true));
        let worker_accepting = accepting.clone();

        thread::Builder::new()
            .name("mcpwa-automation".to_string())
            .spawn(move || {
                debug!("automation worker started");
                while let Some(command) = receiver.blocking_recv() {
                    match command {
                        Command::Run(job) => {
                            if !worker_accepting.load(Ordering::SeqCst) {
                                // Dropping the job drops its reply channel.
                                continue;
                            }
                            job(whatsapp.as_ref());
                        }
                        Command::Shutdown => break,
                    }
                }
                info!("automation worker stopped");
            })?;

        Ok(Self {
            commands,
            accepting,
        })
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Run `operation` on the worker thread and wait for its result.
    ///
    /// Jobs queued behind a shutdown, or submitted after it, fail with `shutting-down`. A
    /// panicking operation is reported as `internal-error`; the worker keeps serving.
    pub async fn run<T, F>(&self, operation: F) -> Result<T, ToolError>
    where
        F: FnOnce(&WhatsApp) -> Result<T, AutomationError> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(operation).wait().await
    }

    /// Queue `operation` now and hand back its pending result.
    ///
    /// The job's place in the queue is fixed when this returns, so callers that submit in
    /// sequence get their operations run in that sequence however the results are awaited.
    pub fn submit<T, F>(&self, operation: F) -> Pending<T>
    where
        F: FnOnce(&WhatsApp) -> Result<T, AutomationError> + Send + 'static,
        T: Send + 'static,
    {
        if !self.is_accepting() {
            return Pending::Failed(ToolError::shutting_down());
        }
        let (reply, outcome) = oneshot::channel();
        let job: Job = Box::new(move |whatsapp| {
            let result = match panic::catch_unwind(AssertUnwindSafe(|| operation(whatsapp))) {
                Ok(result) => result.map_err(ToolError::from),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(%message, "automation operation panicked");
                    Err(ToolError::internal(format!(
                        "automation operation panicked: {message}"
                    )))
                }
            };
            let _ = reply.send(result);
        });
        match self.commands.send(Command::Run(job)) {
            Ok(()) => Pending::Queued(outcome),
            Err(_) => Pending::Failed(ToolError::shutting_down()),
        }
    }

    /// Let the running operation finish and refuse everything after it.
    pub fn shutdown(&self) {
        if self.accepting.swap(false, Ordering::SeqCst) {
            let _ = self.commands.send(Command::Shutdown);
        }
    }
}

impl Drop for AutomationQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The result of a submitted job.
#[must_use = "a pending job's outcome is lost unless awaited"]
pub enum Pending<T> {
    Queued(oneshot::Receiver<Result<T, ToolError>>),
    Failed(ToolError),
}

impl<T> Pending<T> {
    pub async fn wait(self) -> Result<T, ToolError> {
        match self {
            Pending::Queued(outcome) => outcome.await.map_err(|_| ToolError::shutting_down())?,
            Pending::Failed(e) => Err(e),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
