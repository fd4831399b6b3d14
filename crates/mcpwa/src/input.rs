//! Synthetic keyboard input vocabulary.

use std::fmt;
use std::ops::BitOr;

/// Keys the automation engine needs to press in the foreign UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Return,
    Escape,
    Delete,
    Tab,
    A,
    F,
    V,
}

impl Key {
    /// macOS virtual key code (kVK_* in HIToolbox/Events.h).
    pub fn virtual_code(self) -> u16 {
        match self {
            Key::Return => 36,
            Key::Escape => 53,
            Key::Delete => 51,
            Key::Tab => 48,
            Key::A => 0,
            Key::F => 3,
            Key::V => 9,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Key::Return => "Return",
            Key::Escape => "Escape",
            Key::Delete => "Delete",
            Key::Tab => "Tab",
            Key::A => "A",
            Key::F => "F",
            Key::V => "V",
        };
        f.write_str(name)
    }
}

/// Modifier keys held while a [`Key`] is pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    pub const COMMAND: Modifiers = Modifiers(1);
    pub const SHIFT: Modifiers = Modifiers(1 << 1);
    pub const OPTION: Modifiers = Modifiers(1 << 2);
    pub const CONTROL: Modifiers = Modifiers(1 << 3);

    pub fn contains(self, other: Modifiers) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Self) -> Self::Output {
        Modifiers(self.0 | rhs.0)
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.contains(Modifiers::COMMAND) {
            parts.push("Cmd");
        }
        if self.contains(Modifiers::SHIFT) {
            parts.push("Shift");
        }
        if self.contains(Modifiers::OPTION) {
            parts.push("Opt");
        }
        if self.contains(Modifiers::CONTROL) {
            parts.push("Ctrl");
        }
        write!(f, "{}", parts.join("+"))
    }
}
