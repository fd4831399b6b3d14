use crate::element::UIElement;
use crate::errors::AutomationError;
use crate::input::{Key, Modifiers};
use std::sync::Arc;

#[cfg(target_os = "macos")]
pub mod macos;
#[cfg(any(test, feature = "simulator"))]
pub mod memory;
pub mod process;

pub use process::{ProcessCache, ProcessLookup, SysinfoLookup};

/// Bundle identifier of the WhatsApp desktop client.
pub const DEFAULT_BUNDLE_ID: &str = "net.whatsapp.WhatsApp";
/// Process name of the WhatsApp desktop client.
pub const DEFAULT_PROCESS_NAME: &str = "WhatsApp";

/// Identifies the foreign application an engine attaches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetApp {
    pub bundle_id: String,
    pub process_name: String,
}

impl Default for TargetApp {
    fn default() -> Self {
        Self {
            bundle_id: DEFAULT_BUNDLE_ID.to_string(),
            process_name: DEFAULT_PROCESS_NAME.to_string(),
        }
    }
}

/// Read-only query and synthetic-input primitives against one foreign application.
///
/// Implementations never retry: a missing element is reported as
/// [`AutomationError::ElementNotFound`], a missing process or permission as
/// [`AutomationError::AccessibilityUnavailable`]. Key and text dispatch are fire-and-forget and
/// do not wait for the UI to settle.
pub trait AccessibilityEngine: Send + Sync {
    /// Whether the target is running and the host allows querying it.
    fn is_app_available(&self) -> bool;

    /// Cached process identifier of the target, re-resolved after a restart.
    fn process_id(&self) -> Option<u32>;

    /// Bring the target to the foreground.
    fn activate_app(&self) -> bool;

    /// Un-hide and un-minimize the target so its tree reports live data.
    fn ensure_visible(&self) -> bool;

    /// The target's main window.
    fn main_window(&self) -> Result<UIElement, AutomationError>;

    /// The element that currently holds keyboard focus inside the target.
    fn focused_element(&self) -> Result<UIElement, AutomationError>;

    fn dispatch_key(&self, key: Key, modifiers: Modifiers) -> Result<(), AutomationError>;

    fn dispatch_text(&self, text: &str) -> Result<(), AutomationError>;

    /// Forget the cached process identity so the next call resolves it again.
    fn invalidate_process(&self);
}

/// Create the accessibility engine for the current platform.
#[cfg(target_os = "macos")]
pub fn create_engine(target: TargetApp) -> Result<Arc<dyn AccessibilityEngine>, AutomationError> {
    Ok(Arc::new(macos::MacOSEngine::new(target)))
}

/// Create the accessibility engine for the current platform.
#[cfg(not(target_os = "macos"))]
pub fn create_engine(target: TargetApp) -> Result<Arc<dyn AccessibilityEngine>, AutomationError> {
    Err(AutomationError::UnsupportedPlatform(format!(
        "automating '{}' requires the macOS accessibility API (running on {})",
        target.process_name,
        std::env::consts::OS
    )))
}
