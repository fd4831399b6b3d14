//! Element handles into the foreign process's accessibility tree.
//!
//! A [`UIElement`] is only valid for as long as the foreign process keeps the underlying node
//! alive. The WhatsApp client rebuilds large parts of its tree on every redraw, so callers must
//! not hold an element across an action boundary: re-resolve it by identifier or list position
//! at the point of use.

use crate::errors::AutomationError;
use std::fmt;
use std::sync::Arc;

/// Accessibility attribute names as exposed by the host platform.
pub mod attr {
    pub const ROLE: &str = "AXRole";
    pub const SUBROLE: &str = "AXSubrole";
    pub const IDENTIFIER: &str = "AXIdentifier";
    pub const TITLE: &str = "AXTitle";
    pub const DESCRIPTION: &str = "AXDescription";
    pub const VALUE: &str = "AXValue";
    pub const SELECTED: &str = "AXSelected";
    pub const FOCUSED: &str = "AXFocused";
    pub const CHILDREN: &str = "AXChildren";
    pub const MINIMIZED: &str = "AXMinimized";
}

/// Accessibility role names as exposed by the host platform.
pub mod role {
    pub const APPLICATION: &str = "AXApplication";
    pub const WINDOW: &str = "AXWindow";
    pub const GROUP: &str = "AXGroup";
    pub const BUTTON: &str = "AXButton";
    pub const RADIO_BUTTON: &str = "AXRadioButton";
    pub const TEXT_FIELD: &str = "AXTextField";
    pub const TEXT_AREA: &str = "AXTextArea";
    pub const STATIC_TEXT: &str = "AXStaticText";
    pub const LIST: &str = "AXList";
    pub const TABLE: &str = "AXTable";
    pub const ROW: &str = "AXRow";
    pub const CELL: &str = "AXCell";
    pub const GENERIC_ELEMENT: &str = "AXGenericElement";
}

/// A single attribute value read from an element.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Bool(bool),
    Number(f64),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean view of the value. Toggle-style controls report selection as `0`/`1`
    /// numbers on some builds, so numbers are accepted too.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            AttributeValue::Number(n) => Some(*n != 0.0),
            AttributeValue::String(s) => match s.as_str() {
                "1" | "true" => Some(true),
                "0" | "false" => Some(false),
                _ => None,
            },
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

/// Platform-specific element operations.
pub trait UIElementImpl: Send + Sync + fmt::Debug {
    /// Stable identity of the node for the lifetime of this handle, used for equality.
    fn object_id(&self) -> u64;

    fn role(&self) -> Result<String, AutomationError>;

    fn attribute(&self, name: &str) -> Result<Option<AttributeValue>, AutomationError>;

    fn children(&self) -> Result<Vec<UIElement>, AutomationError>;

    /// Press the element (AXPress or a synthetic click at its centre).
    fn click(&self) -> Result<(), AutomationError>;

    /// Give the element keyboard focus.
    fn focus(&self) -> Result<(), AutomationError>;
}

/// Handle to a node in the foreign process's UI tree.
#[derive(Clone)]
pub struct UIElement {
    inner: Arc<dyn UIElementImpl>,
}

impl UIElement {
    pub fn new(inner: Arc<dyn UIElementImpl>) -> Self {
        Self { inner }
    }

    pub fn object_id(&self) -> u64 {
        self.inner.object_id()
    }

    pub fn role(&self) -> Result<String, AutomationError> {
        self.inner.role()
    }

    pub fn attribute(&self, name: &str) -> Result<Option<AttributeValue>, AutomationError> {
        self.inner.attribute(name)
    }

    pub fn children(&self) -> Result<Vec<UIElement>, AutomationError> {
        self.inner.children()
    }

    pub fn click(&self) -> Result<(), AutomationError> {
        self.inner.click()
    }

    pub fn focus(&self) -> Result<(), AutomationError> {
        self.inner.focus()
    }

    /// String attribute, treating empty strings as absent.
    pub fn string_attribute(&self, name: &str) -> Result<Option<String>, AutomationError> {
        Ok(self
            .attribute(name)?
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.is_empty()))
    }

    pub fn bool_attribute(&self, name: &str) -> Result<bool, AutomationError> {
        Ok(self
            .attribute(name)?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    pub fn identifier(&self) -> Result<Option<String>, AutomationError> {
        self.string_attribute(attr::IDENTIFIER)
    }

    pub fn title(&self) -> Result<Option<String>, AutomationError> {
        self.string_attribute(attr::TITLE)
    }

    pub fn description(&self) -> Result<Option<String>, AutomationError> {
        self.string_attribute(attr::DESCRIPTION)
    }

    pub fn value(&self) -> Result<Option<String>, AutomationError> {
        self.string_attribute(attr::VALUE)
    }

    pub fn is_selected(&self) -> Result<bool, AutomationError> {
        self.bool_attribute(attr::SELECTED)
    }
}

impl PartialEq for UIElement {
    fn eq(&self, other: &Self) -> bool {
        self.object_id() == other.object_id()
    }
}

impl Eq for UIElement {}

impl fmt::Debug for UIElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UIElement")
            .field("inner", &self.inner)
            .finish()
    }
}
