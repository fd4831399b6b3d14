use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter};

/// Environment variable consulted when neither `--log-level` nor `RUST_LOG` is set.
pub const LOG_LEVEL_ENV: &str = "MCPWA_LOG_LEVEL";

const LOG_FILE_PREFIX: &str = "mcpwa-agent.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        })
    }
}

/// Receives the gateway's lifecycle and transport messages on behalf of the hosting
/// application. Implementations must not block.
pub trait LogSink: Send + Sync {
    fn on_log(&self, message: &str, level: LogLevel);
}

/// Forwards to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn on_log(&self, message: &str, level: LogLevel) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "mcpwa_agent::gateway", "{message}"),
            LogLevel::Info => tracing::info!(target: "mcpwa_agent::gateway", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "mcpwa_agent::gateway", "{message}"),
            LogLevel::Error => tracing::error!(target: "mcpwa_agent::gateway", "{message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
}

/// Queues records on an unbounded channel for the host to drain.
#[derive(Debug, Clone)]
pub struct ChannelLogSink {
    sender: mpsc::UnboundedSender<LogRecord>,
}

impl ChannelLogSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LogRecord>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl LogSink for ChannelLogSink {
    fn on_log(&self, message: &str, level: LogLevel) {
        // A host that stopped listening just loses the record.
        let _ = self.sender.send(LogRecord {
            level,
            message: message.to_string(),
        });
    }
}

/// Filter directive in priority order: explicit flag > `RUST_LOG` > `MCPWA_LOG_LEVEL` > "info".
pub fn filter_directive(
    cli_level: Option<&str>,
    rust_log: Option<String>,
    env_level: Option<String>,
) -> String {
    let set = |d: &String| !d.trim().is_empty();
    cli_level
        .map(str::to_string)
        .filter(set)
        .or(rust_log.filter(set))
        .or(env_level.filter(set))
        .unwrap_or_else(|| "info".to_string())
}

/// Install the global subscriber.
///
/// Human-readable logs go to stderr without colors; stdout carries the protocol in stdio
/// mode. With `log_dir`, a daily rolling file is written as well. The returned guard flushes
/// that file and must live until exit.
pub fn init_logging(
    cli_level: Option<&str>,
    log_dir: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    let directive = filter_directive(
        cli_level,
        std::env::var("RUST_LOG").ok(),
        std::env::var(LOG_LEVEL_ENV).ok(),
    );
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("invalid log filter '{directive}'"))?;

    let stderr_layer = tracing_fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_timer(LocalTime::new(Rfc3339))
        .with_target(true);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(LocalTime::new(Rfc3339));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("a global tracing subscriber is already installed")?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_priority() {
        assert_eq!(
            filter_directive(Some("debug"), Some("warn".into()), Some("error".into())),
            "debug"
        );
        assert_eq!(
            filter_directive(None, Some("mcpwa=trace".into()), Some("error".into())),
            "mcpwa=trace"
        );
        assert_eq!(filter_directive(None, None, Some("error".into())), "error");
        assert_eq!(filter_directive(None, None, None), "info");
        assert_eq!(filter_directive(None, Some("  ".into()), None), "info");
    }

    #[test]
    fn test_channel_sink_never_blocks() {
        let (sink, mut records) = ChannelLogSink::new();
        sink.on_log("client connected", LogLevel::Info);
        assert_eq!(
            records.try_recv().unwrap(),
            LogRecord {
                level: LogLevel::Info,
                message: "client connected".to_string(),
            }
        );

        drop(records);
        sink.on_log("nobody listening", LogLevel::Warn);
    }
}
