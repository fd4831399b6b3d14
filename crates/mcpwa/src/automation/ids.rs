//! Accessibility identifiers of the WhatsApp desktop client's controls.

use crate::types::{ChatFilter, Tab};

pub const CHAT_LIST: &str = "ChatListView";
pub const CHAT_LIST_ROW: &str = "ChatListView_Cell";

pub const SEARCH_FIELD: &str = "ChatListSearchField";
pub const SEARCH_VIEW: &str = "ChatListSearchView";
pub const SEARCH_CHAT_RESULT: &str = "ChatListSearchView_ChatResult";
pub const SEARCH_MESSAGE_RESULT: &str = "ChatListSearchView_MessageResult";

pub const FILTER_BAR: &str = "ChatListFilters";
pub const TAB_BAR: &str = "TabBar";

pub const HEADER: &str = "ConversationHeader";
pub const HEADER_TITLE: &str = "ConversationHeader_Title";
pub const HEADER_SUBTITLE: &str = "ConversationHeader_Subtitle";

pub const MESSAGE_LIST: &str = "ConversationMessages";
pub const MESSAGE_BUBBLE: &str = "MessageBubble";
pub const COMPOSE_FIELD: &str = "ComposeField";

pub fn filter_button(filter: ChatFilter) -> &'static str {
    match filter {
        ChatFilter::All => "ChatListFilter_All",
        ChatFilter::Unread => "ChatListFilter_Unread",
        ChatFilter::Favorites => "ChatListFilter_Favorites",
        ChatFilter::Groups => "ChatListFilter_Groups",
    }
}

pub fn tab_button(tab: Tab) -> &'static str {
    match tab {
        Tab::Chats => "TabBar_Chats",
        Tab::Calls => "TabBar_Calls",
        Tab::Archived => "TabBar_Archived",
        Tab::Settings => "TabBar_Settings",
    }
}
