use std::fmt;

/// Represents ways to locate a UI element in the WhatsApp window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Select by accessibility role, e.g. `AXButton`
    Role(String),
    /// Select by accessibility identifier
    Id(String),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

impl Selector {
    pub fn id(identifier: &str) -> Self {
        Selector::Id(identifier.to_string())
    }

    pub fn role(role: &str) -> Self {
        Selector::Role(role.to_string())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Role(role) => write!(f, "role:{role}"),
            Selector::Id(id) => write!(f, "id:{id}"),
            Selector::Invalid(reason) => write!(f, "invalid({reason})"),
        }
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();
        if let Some(role) = s.strip_prefix("role:") {
            let role = role.trim();
            if role.is_empty() {
                return Selector::Invalid("empty role".to_string());
            }
            return Selector::role(role);
        }
        if let Some(id) = s.strip_prefix("id:").or_else(|| s.strip_prefix('#')) {
            return Selector::id(id.trim());
        }
        if s.starts_with("AX") {
            return Selector::role(s);
        }
        if s.is_empty() {
            return Selector::Invalid("empty selector".to_string());
        }
        Selector::id(s)
    }
}
