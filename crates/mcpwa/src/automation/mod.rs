//! High-level operations on the WhatsApp desktop client.
//!
//! [`WhatsApp`] composes the accessibility layer with the description parsers. Every
//! operation starts from the main window and re-resolves the elements it touches; no element
//! handle outlives the call that found it. Operations block on cross-process queries and
//! bounded polls, so they belong on a dedicated worker thread, one at a time.

pub mod chats;
pub mod config;
pub mod conversation;
pub mod ids;
pub mod search;

use std::sync::Arc;
use std::thread;

use tracing::{debug, info, warn};

use crate::element::UIElement;
use crate::errors::AutomationError;
use crate::input::{Key, Modifiers};
use crate::locator::Locator;
use crate::platforms::AccessibilityEngine;
use crate::selector::Selector;

pub use config::{AutomationConfig, PollConfig};

/// Driver for one WhatsApp desktop client.
pub struct WhatsApp {
    engine: Arc<dyn AccessibilityEngine>,
    config: AutomationConfig,
}

impl WhatsApp {
    pub fn new(engine: Arc<dyn AccessibilityEngine>, config: AutomationConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn AccessibilityEngine> {
        &self.engine
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_app_available()
    }

    pub fn process_id(&self) -> Option<u32> {
        self.engine.process_id()
    }

    /// Check the client is running, bring it forward and make its window queryable.
    /// Returns the resolved process id.
    pub fn start_session(&self) -> Result<Option<u32>, AutomationError> {
        self.ensure_ready()?;
        if !self.engine.activate_app() {
            warn!("could not activate WhatsApp; continuing with the window in the background");
        }
        let pid = self.engine.process_id();
        info!(?pid, "automation session started");
        Ok(pid)
    }

    /// Leave search mode if needed and forget the cached process identity.
    pub fn stop_session(&self) -> Result<(), AutomationError> {
        if self.is_available() {
            match self.is_in_search_mode() {
                Ok(true) => {
                    if !self.clear_search()? {
                        warn!("search mode still active at session stop");
                    }
                }
                Ok(false) => {}
                Err(e) if e.is_hard_failure() => return Err(e),
                Err(e) => debug!(error = %e, "could not read search state at session stop"),
            }
        }
        self.engine.invalidate_process();
        info!("automation session stopped");
        Ok(())
    }

    /// Every entry point that reads live data goes through here first: a hidden or
    /// minimized window answers queries with stale data or not at all.
    pub(crate) fn ensure_ready(&self) -> Result<(), AutomationError> {
        if !self.engine.is_app_available() {
            return Err(AutomationError::AccessibilityUnavailable(
                "WhatsApp is not running".to_string(),
            ));
        }
        if !self.engine.ensure_visible() {
            warn!("WhatsApp window could not be made visible");
        }
        Ok(())
    }

    pub(crate) fn window(&self) -> Result<UIElement, AutomationError> {
        self.engine.main_window()
    }

    pub(crate) fn locate(&self, root: UIElement, selector: impl Into<Selector>) -> Locator {
        Locator::new(root, selector).max_depth(self.config.max_search_depth)
    }

    /// Whether `element` holds keyboard focus inside the client.
    pub(crate) fn has_focus(&self, element: &UIElement) -> Result<bool, AutomationError> {
        match self.engine.focused_element() {
            Ok(focused) => Ok(focused == *element),
            Err(e) if e.is_hard_failure() => Err(e),
            Err(_) => Ok(false),
        }
    }

    /// Element with `identifier` anywhere below the main window, if present.
    pub(crate) fn find(&self, identifier: &str) -> Result<Option<UIElement>, AutomationError> {
        self.locate(self.window()?, Selector::id(identifier)).try_first()
    }

    pub(crate) fn require(&self, identifier: &str) -> Result<UIElement, AutomationError> {
        self.find(identifier)?
            .ok_or_else(|| AutomationError::ElementNotFound(identifier.to_string()))
    }

    /// Children of `container` whose identifier is one of `row_ids`, in rendered order.
    pub(crate) fn rows_of(
        &self,
        container: &UIElement,
        row_ids: &[&str],
    ) -> Result<Vec<UIElement>, AutomationError> {
        let mut rows = Vec::new();
        for child in container.children()? {
            let id = child.identifier()?;
            if id.as_deref().is_some_and(|id| row_ids.contains(&id)) {
                rows.push(child);
            }
        }
        Ok(rows)
    }

    pub(crate) fn press(&self, key: Key, modifiers: Modifiers) -> Result<(), AutomationError> {
        self.engine.dispatch_key(key, modifiers)
    }

    /// Replace whatever text the focused field holds with `text`.
    pub(crate) fn replace_text(&self, text: &str) -> Result<(), AutomationError> {
        self.press(Key::A, Modifiers::COMMAND)?;
        self.press(Key::Delete, Modifiers::NONE)?;
        if !text.is_empty() {
            self.engine.dispatch_text(text)?;
        }
        Ok(())
    }

    pub(crate) fn settle(&self) {
        let delay = self.config.settle_delay();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}
