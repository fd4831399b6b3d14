use std::fmt;
use std::io;
use std::path::PathBuf;

use mcpwa::AutomationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes carried in the `error.code` field of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    MalformedRequest,
    UnknownTool,
    InvalidParams,
    NotFound,
    AccessibilityUnavailable,
    ActionTimeout,
    ShuttingDown,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MalformedRequest => "malformed-request",
            ErrorCode::UnknownTool => "unknown-tool",
            ErrorCode::InvalidParams => "invalid-params",
            ErrorCode::NotFound => "not-found",
            ErrorCode::AccessibilityUnavailable => "accessibility-unavailable",
            ErrorCode::ActionTimeout => "action-timeout",
            ErrorCode::ShuttingDown => "shutting-down",
            ErrorCode::InternalError => "internal-error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed tool call, as sent back to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ToolError {
    pub code: ErrorCode,
    pub message: String,
}

impl ToolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedRequest, message)
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(ErrorCode::UnknownTool, format!("unknown tool '{name}'"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn shutting_down() -> Self {
        Self::new(
            ErrorCode::ShuttingDown,
            "the automation worker is shutting down",
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl From<AutomationError> for ToolError {
    fn from(err: AutomationError) -> Self {
        let code = match &err {
            AutomationError::ElementNotFound(_) => ErrorCode::NotFound,
            AutomationError::AccessibilityUnavailable(_)
            | AutomationError::UnsupportedPlatform(_) => ErrorCode::AccessibilityUnavailable,
            AutomationError::Timeout(_) => ErrorCode::ActionTimeout,
            AutomationError::InvalidArgument(_) => ErrorCode::InvalidParams,
            AutomationError::PlatformError(_) => ErrorCode::InternalError,
        };
        Self::new(code, err.to_string())
    }
}

/// Failures of a transport instance. Any of these ends that instance.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to bind {}: {source}", .path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is in use by a live server", .0.display())]
    AddressInUse(PathBuf),

    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("transport already started")]
    AlreadyStarted,

    #[error("no client is connected")]
    NotConnected,

    #[error("connection {0} has closed")]
    ConnectionClosed(u64),

    #[error("unsupported transport: {0}")]
    Unsupported(String),
}

/// Why [`GatewayServer::start`](crate::server::GatewayServer::start) failed.
#[derive(Error, Debug)]
pub enum StartError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to spawn the automation worker: {0}")]
    Worker(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_automation_error_codes() {
        let cases = [
            (
                AutomationError::ElementNotFound("row".into()),
                ErrorCode::NotFound,
            ),
            (
                AutomationError::AccessibilityUnavailable("not running".into()),
                ErrorCode::AccessibilityUnavailable,
            ),
            (
                AutomationError::UnsupportedPlatform("linux".into()),
                ErrorCode::AccessibilityUnavailable,
            ),
            (
                AutomationError::Timeout("header".into()),
                ErrorCode::ActionTimeout,
            ),
            (
                AutomationError::InvalidArgument("empty".into()),
                ErrorCode::InvalidParams,
            ),
            (
                AutomationError::PlatformError("AXError -25204".into()),
                ErrorCode::InternalError,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(ToolError::from(err).code, code);
        }
    }

    #[test]
    fn test_tool_error_wire_shape() {
        let err = ToolError::not_found("no chat named 'Nobody'");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"code": "not-found", "message": "no chat named 'Nobody'"})
        );
    }

    #[test]
    fn test_code_strings_match_serde() {
        for code in [
            ErrorCode::MalformedRequest,
            ErrorCode::UnknownTool,
            ErrorCode::InvalidParams,
            ErrorCode::NotFound,
            ErrorCode::AccessibilityUnavailable,
            ErrorCode::ActionTimeout,
            ErrorCode::ShuttingDown,
            ErrorCode::InternalError,
        ] {
            assert_eq!(
                serde_json::to_value(code).unwrap(),
                serde_json::Value::String(code.as_str().to_string())
            );
        }
    }
}
