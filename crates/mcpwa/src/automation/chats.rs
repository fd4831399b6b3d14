use tracing::{debug, info, instrument, warn};

use super::{ids, WhatsApp};
use crate::element::UIElement;
use crate::errors::AutomationError;
use crate::parsers::{parse_chat_row, parse_header_title, parse_search_row, SearchRowKind};
use crate::selector::Selector;
use crate::types::{ChatEntry, ChatFilter, ChatListSource, Tab};
use crate::utils::{best_match, match_name, normalize, NameMatch};

impl WhatsApp {
    /// Chats in the sidebar under `filter`.
    ///
    /// Leaves search mode and switches the filter toggle first when needed. `None` means the
    /// client never reached the requested state within the configured bounds.
    #[instrument(skip(self))]
    pub fn list_chats(&self, filter: ChatFilter) -> Result<Option<Vec<ChatEntry>>, AutomationError> {
        self.ensure_ready()?;
        if self.is_in_search_mode()? && !self.clear_search()? {
            warn!("could not leave search mode before listing chats");
            return Ok(None);
        }
        if self.find(ids::CHAT_LIST)?.is_none() && !self.navigate_to(Tab::Chats)? {
            warn!("chat list is not on screen");
            return Ok(None);
        }
        if self.selected_chat_filter()? != filter && !self.select_chat_filter(filter)? {
            warn!(%filter, "chat filter did not apply");
            return Ok(None);
        }
        self.settle();
        let chats = self.visible_chats()?;
        debug!(count = chats.len(), "listed chats");
        Ok(Some(chats))
    }

    /// Parse the rows currently rendered in the chat list. Unparseable rows are skipped.
    pub(crate) fn visible_chats(&self) -> Result<Vec<ChatEntry>, AutomationError> {
        let rows = self.chat_list_rows()?;
        let mut chats = Vec::with_capacity(rows.len());
        for (position, row) in rows.iter().enumerate() {
            let Some(description) = row.description()? else {
                debug!(position, "chat row without description");
                continue;
            };
            match parse_chat_row(&description, position, ChatListSource::ChatList) {
                Some(entry) => chats.push(entry),
                None => debug!(position, %description, "skipping unparseable chat row"),
            }
        }
        Ok(chats)
    }

    fn chat_list_rows(&self) -> Result<Vec<UIElement>, AutomationError> {
        match self.find(ids::CHAT_LIST)? {
            Some(list) => self.rows_of(&list, &[ids::CHAT_LIST_ROW]),
            None => Ok(Vec::new()),
        }
    }

    /// The filter toggle currently selected. A client without a filter bar behaves as `All`.
    pub fn selected_chat_filter(&self) -> Result<ChatFilter, AutomationError> {
        self.ensure_ready()?;
        let Some(bar) = self.find(ids::FILTER_BAR)? else {
            return Ok(ChatFilter::All);
        };
        for button in bar.children()? {
            if !button.is_selected()? {
                continue;
            }
            let id = button.identifier()?;
            if let Some(filter) = ChatFilter::ALL
                .into_iter()
                .find(|f| id.as_deref() == Some(ids::filter_button(*f)))
            {
                return Ok(filter);
            }
        }
        Ok(ChatFilter::All)
    }

    /// Click the toggle for `filter` and wait for it to report itself selected.
    #[instrument(skip(self))]
    pub fn select_chat_filter(&self, filter: ChatFilter) -> Result<bool, AutomationError> {
        self.ensure_ready()?;
        let id = ids::filter_button(filter);
        let Some(button) = self.find(id)? else {
            warn!(%filter, "filter toggle not on screen");
            return Ok(false);
        };
        if button.is_selected()? {
            return Ok(true);
        }
        button.click()?;
        self.config
            .filter
            .poll("filter toggle selected", || self.require(id)?.is_selected())
    }

    /// Switch the sidebar to `tab`.
    #[instrument(skip(self))]
    pub fn navigate_to(&self, tab: Tab) -> Result<bool, AutomationError> {
        self.ensure_ready()?;
        let id = ids::tab_button(tab);
        let Some(button) = self.find(id)? else {
            warn!(?tab, "tab button not on screen");
            return Ok(false);
        };
        if button.is_selected()? {
            return Ok(true);
        }
        button.click()?;
        self.config
            .tab_navigation
            .poll("tab selected", || self.require(id)?.is_selected())
    }

    /// Resolve a chat by display name.
    ///
    /// Search results are consulted first when the client is already in search mode,
    /// otherwise the visible chat list. Only when both miss is a fresh search issued, after
    /// which the search results are scanned once more.
    #[instrument(skip(self))]
    pub fn find_chat_by_name(&self, name: &str) -> Result<Option<ChatEntry>, AutomationError> {
        if normalize(name).is_empty() {
            return Err(AutomationError::InvalidArgument(
                "chat name must not be empty".to_string(),
            ));
        }
        self.ensure_ready()?;

        if self.is_in_search_mode()? {
            if let Some(hit) = self.match_search_chats(name)? {
                debug!(tier = 1, chat = %hit.name, "resolved chat in search results");
                return Ok(Some(hit));
            }
        } else {
            let visible = self.visible_chats()?;
            if let Some(hit) = best_match(&visible, |c| c.name.as_str(), name) {
                debug!(tier = 2, chat = %hit.name, "resolved chat in chat list");
                return Ok(Some(hit.clone()));
            }
        }

        if self.global_search(name)?.is_none() {
            debug!("search panel did not populate; scanning whatever is rendered");
        }
        let hit = self.match_search_chats(name)?;
        match &hit {
            Some(hit) => debug!(tier = 3, chat = %hit.name, "resolved chat after fresh search"),
            None => info!("no chat matches the requested name"),
        }
        Ok(hit)
    }

    fn match_search_chats(&self, name: &str) -> Result<Option<ChatEntry>, AutomationError> {
        let (chats, _) = self.read_search_panel()?;
        Ok(best_match(&chats, |c| c.name.as_str(), name).cloned())
    }

    /// Click the row for `entry` and wait for the conversation header to show it.
    ///
    /// The row is looked up again by `entry.list_position`; if the list has shifted since
    /// `entry` was read, the row is found by name instead.
    #[instrument(skip(self, entry), fields(chat = %entry.name))]
    pub fn open_chat(&self, entry: &ChatEntry) -> Result<bool, AutomationError> {
        self.ensure_ready()?;
        let Some(row) = self.resolve_chat_row(entry)? else {
            warn!("chat row is no longer on screen");
            return Ok(false);
        };
        row.click()?;
        self.settle();
        let opened = self
            .config
            .open_chat
            .poll("conversation header shows chat", || self.header_shows(&entry.name))?;
        if !opened {
            warn!("conversation header never showed the chat");
        }
        Ok(opened)
    }

    /// Resolve `name` and open it. `None` when no tier finds the chat.
    pub fn open_chat_with_name(&self, name: &str) -> Result<Option<bool>, AutomationError> {
        match self.find_chat_by_name(name)? {
            Some(entry) => self.open_chat(&entry).map(Some),
            None => Ok(None),
        }
    }

    fn resolve_chat_row(&self, entry: &ChatEntry) -> Result<Option<UIElement>, AutomationError> {
        let rows = match entry.source {
            ChatListSource::ChatList => self.chat_list_rows()?,
            ChatListSource::SearchResults => self.search_rows()?,
        };

        if let Some(row) = rows.get(entry.list_position) {
            if self.row_has_name(row, entry.source, &entry.name)? {
                return Ok(Some(row.clone()));
            }
            debug!(position = entry.list_position, "row moved, rescanning by name");
        }
        for row in rows {
            if self.row_has_name(&row, entry.source, &entry.name)? {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn row_has_name(
        &self,
        row: &UIElement,
        source: ChatListSource,
        name: &str,
    ) -> Result<bool, AutomationError> {
        let Some(description) = row.description()? else {
            return Ok(false);
        };
        let row_name = match source {
            ChatListSource::ChatList => parse_chat_row(&description, 0, source).map(|c| c.name),
            ChatListSource::SearchResults => {
                let kind = if row.identifier()?.as_deref() == Some(ids::SEARCH_CHAT_RESULT) {
                    SearchRowKind::Chat
                } else {
                    SearchRowKind::Message
                };
                parse_search_row(&description, 0, kind).and_then(|r| r.chat_name)
            }
        };
        Ok(row_name.is_some_and(|n| match_name(&n, name) == Some(NameMatch::Exact)))
    }

    /// Name shown in the conversation header, if a chat is open.
    pub fn current_chat_name(&self) -> Result<Option<String>, AutomationError> {
        let Some(header) = self.find(ids::HEADER)? else {
            return Ok(None);
        };
        let title = match self.locate(header.clone(), Selector::id(ids::HEADER_TITLE)).try_first()? {
            Some(title) => title.value()?.or(title.title()?),
            None => header.title()?.or(header.description()?),
        };
        Ok(title.as_deref().and_then(parse_header_title))
    }

    pub(crate) fn header_shows(&self, name: &str) -> Result<bool, AutomationError> {
        Ok(self
            .current_chat_name()?
            .is_some_and(|shown| match_name(&shown, name) == Some(NameMatch::Exact)))
    }
}
