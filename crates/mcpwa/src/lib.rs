//! WhatsApp desktop automation through accessibility APIs
//!
//! This crate drives an independently running WhatsApp desktop client by reading its
//! accessibility tree and sending it synthetic input. Description strings on list rows and
//! message bubbles are parsed into typed records; actions are followed by bounded polling
//! because the client redraws asynchronously.

pub mod automation;
pub mod element;
pub mod errors;
pub mod input;
pub mod locator;
pub mod parsers;
pub mod platforms;
pub mod selector;
#[cfg(any(test, feature = "simulator"))]
pub mod simulator;
#[cfg(test)]
mod tests;
pub mod types;
pub mod utils;

pub use automation::{AutomationConfig, PollConfig, WhatsApp};
pub use element::{AttributeValue, UIElement, UIElementImpl};
pub use errors::AutomationError;
pub use input::{Key, Modifiers};
pub use locator::Locator;
pub use platforms::{create_engine, AccessibilityEngine, TargetApp};
pub use selector::Selector;
pub use types::{
    Attachment, AttachmentKind, ChatEntry, ChatFilter, ChatListSource, CurrentChat,
    MessageDirection, MessageEntry, ReadReceipt, SearchResultEntry, SearchResultKind,
    SearchResults, Tab,
};
