//! Domain records read from the WhatsApp UI.
//!
//! Records are built per query and handed to the caller; nothing here keeps a reference into
//! the accessibility tree.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mutually exclusive chat list filter toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatFilter {
    #[default]
    All,
    Unread,
    Favorites,
    Groups,
}

impl ChatFilter {
    pub const ALL: [ChatFilter; 4] = [
        ChatFilter::All,
        ChatFilter::Unread,
        ChatFilter::Favorites,
        ChatFilter::Groups,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChatFilter::All => "all",
            ChatFilter::Unread => "unread",
            ChatFilter::Favorites => "favorites",
            ChatFilter::Groups => "groups",
        }
    }
}

impl fmt::Display for ChatFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "all" => Ok(ChatFilter::All),
            "unread" => Ok(ChatFilter::Unread),
            "favorites" | "favourites" | "favorite" | "favourite" => Ok(ChatFilter::Favorites),
            "groups" | "group" => Ok(ChatFilter::Groups),
            other => Err(format!(
                "unknown chat filter '{other}' (expected all, unread, favorites or groups)"
            )),
        }
    }
}

/// Top-level navigation tabs of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    Chats,
    Calls,
    Archived,
    Settings,
}

impl FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chats" | "chat" => Ok(Tab::Chats),
            "calls" | "call" => Ok(Tab::Calls),
            "archived" | "archive" => Ok(Tab::Archived),
            "settings" => Ok(Tab::Settings),
            other => Err(format!(
                "unknown tab '{other}' (expected chats, calls, archived or settings)"
            )),
        }
    }
}

/// Which on-screen list a [`ChatEntry`] was read from. `list_position` indexes into that list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChatListSource {
    #[default]
    ChatList,
    SearchResults,
}

/// One row of the chat list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    pub name: String,
    pub last_message_preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_for_groups: Option<String>,
    pub pinned: bool,
    pub is_group: bool,
    pub unread: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<u32>,
    pub list_position: usize,
    #[serde(default)]
    pub source: ChatListSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    Incoming,
    Outgoing,
    System,
}

/// Delivery state shown on outgoing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadReceipt {
    Sent,
    Delivered,
    Read,
}

/// One rendered message bubble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEntry {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub direction: MessageDirection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_sender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_text: Option<String>,
    #[serde(default)]
    pub reactions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_receipt: Option<ReadReceipt>,
}

/// The conversation currently open in the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentChat {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_text: Option<String>,
    /// Oldest to newest, as rendered.
    pub messages: Vec<MessageEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchResultKind {
    Message,
    Chat,
    Photo,
    Link,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    #[default]
    None,
    Image,
    Link,
    Document,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub kind: AttachmentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One row of the global search panel. `list_position` is the handle for
/// [`crate::WhatsApp::open_search_result`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultEntry {
    pub kind: SearchResultKind,
    pub list_position: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub is_outgoing: bool,
    pub attachment: Attachment,
}

/// Result of a global search: chats matched by name and messages matched by content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub query: String,
    pub chat_matches: Vec<ChatEntry>,
    pub message_matches: Vec<SearchResultEntry>,
}
