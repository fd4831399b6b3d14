use thiserror::Error;

/// Failures raised by the accessibility layer and the automation engine.
///
/// `ElementNotFound` and `Timeout` describe the ordinary outcome of driving a live UI that
/// had not (yet) reached the expected state. `AccessibilityUnavailable` means no query can
/// succeed at all: the target process is gone or the host has not granted access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Accessibility unavailable: {0}")]
    AccessibilityUnavailable(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Platform error: {0}")]
    PlatformError(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

impl AutomationError {
    /// True for failures that no amount of polling can recover from.
    pub fn is_hard_failure(&self) -> bool {
        matches!(
            self,
            AutomationError::AccessibilityUnavailable(_) | AutomationError::UnsupportedPlatform(_)
        )
    }
}
