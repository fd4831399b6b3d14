use tracing::{debug, instrument, warn};

use super::{ids, WhatsApp};
use crate::element::UIElement;
use crate::errors::AutomationError;
use crate::input::{Key, Modifiers};
use crate::parsers::tokens::{NONVISUAL_MEDIA_ID, VISUAL_MEDIA_ID};
use crate::parsers::{classify_attachment, parse_search_row, SearchRowKind};
use crate::types::{
    Attachment, ChatEntry, ChatListSource, SearchResultEntry, SearchResultKind, SearchResults, Tab,
};
use crate::utils::normalize;

impl WhatsApp {
    /// True while the search field holds a query and either has focus or is showing its
    /// results panel. Subsequent reads then have to use the search panel, not the chat list.
    pub fn is_in_search_mode(&self) -> Result<bool, AutomationError> {
        self.ensure_ready()?;
        let Some(field) = self.find(ids::SEARCH_FIELD)? else {
            return Ok(false);
        };
        if field.value()?.map_or(true, |v| v.trim().is_empty()) {
            return Ok(false);
        }
        Ok(self.has_focus(&field)? || self.find(ids::SEARCH_VIEW)?.is_some())
    }

    fn search_field_text(&self) -> Result<Option<String>, AutomationError> {
        match self.find(ids::SEARCH_FIELD)? {
            Some(field) => field.value(),
            None => Ok(None),
        }
    }

    /// Type `query` into the search field and read both result groups once the panel shows.
    /// `None` when the panel did not appear within the configured bound.
    #[instrument(skip(self))]
    pub fn global_search(&self, query: &str) -> Result<Option<SearchResults>, AutomationError> {
        if query.trim().is_empty() {
            return Err(AutomationError::InvalidArgument(
                "search query must not be empty".to_string(),
            ));
        }
        self.ensure_ready()?;
        if self.find(ids::SEARCH_FIELD)?.is_none() && !self.navigate_to(Tab::Chats)? {
            return Err(AutomationError::ElementNotFound(ids::SEARCH_FIELD.to_string()));
        }
        let field = self.require(ids::SEARCH_FIELD)?;
        field.click()?;
        self.replace_text(query)?;
        self.settle();

        let wanted = normalize(query);
        let populated = self.config.search_populate.poll("search panel populated", || {
            let typed = self
                .search_field_text()?
                .is_some_and(|text| normalize(&text) == wanted);
            Ok(typed && self.find(ids::SEARCH_VIEW)?.is_some())
        })?;
        if !populated {
            warn!("search panel did not appear");
            return Ok(None);
        }

        let (chat_matches, message_matches) = self.read_search_panel()?;
        debug!(
            chats = chat_matches.len(),
            messages = message_matches.len(),
            "search finished"
        );
        Ok(Some(SearchResults {
            query: query.to_string(),
            chat_matches,
            message_matches,
        }))
    }

    /// Empty the search field and wait for the client to leave search mode.
    #[instrument(skip(self))]
    pub fn clear_search(&self) -> Result<bool, AutomationError> {
        self.ensure_ready()?;
        let Some(field) = self.find(ids::SEARCH_FIELD)? else {
            return Ok(true);
        };
        if field.value()?.is_none() && !self.is_in_search_mode()? {
            return Ok(true);
        }
        field.click()?;
        self.replace_text("")?;
        self.press(Key::Escape, Modifiers::NONE)?;
        self.config
            .search_clear
            .poll("search mode left", || Ok(!self.is_in_search_mode()?))
    }

    /// Every row of the search panel, chat and message groups alike, with `list_position`
    /// indexing the panel. Empty when the client is not in search mode.
    pub fn search_results(&self) -> Result<Vec<SearchResultEntry>, AutomationError> {
        self.ensure_ready()?;
        let rows = self.search_rows()?;
        let mut entries = Vec::with_capacity(rows.len());
        for (position, row) in rows.iter().enumerate() {
            if let Some(entry) = self.parse_search_result(row, position)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Click the search result at `index` and wait for its conversation to open.
    #[instrument(skip(self))]
    pub fn open_search_result(&self, index: usize) -> Result<bool, AutomationError> {
        self.ensure_ready()?;
        let rows = self.search_rows()?;
        let Some(row) = rows.get(index) else {
            warn!(available = rows.len(), "no search result at that index");
            return Ok(false);
        };
        let target = self
            .parse_search_result(row, index)?
            .and_then(|entry| entry.chat_name);
        row.click()?;
        self.settle();
        self.config
            .open_chat
            .poll("search result opened", || match &target {
                Some(name) => self.header_shows(name),
                None => Ok(self.current_chat_name()?.is_some()),
            })
    }

    pub(crate) fn search_rows(&self) -> Result<Vec<UIElement>, AutomationError> {
        match self.find(ids::SEARCH_VIEW)? {
            Some(view) => {
                self.rows_of(&view, &[ids::SEARCH_CHAT_RESULT, ids::SEARCH_MESSAGE_RESULT])
            }
            None => Ok(Vec::new()),
        }
    }

    /// Search panel split into chat-name matches and message matches.
    pub(crate) fn read_search_panel(
        &self,
    ) -> Result<(Vec<ChatEntry>, Vec<SearchResultEntry>), AutomationError> {
        let mut chats = Vec::new();
        let mut messages = Vec::new();
        for entry in self.search_results()? {
            if entry.kind == SearchResultKind::Chat {
                chats.extend(chat_entry_from_result(&entry));
            } else {
                messages.push(entry);
            }
        }
        Ok((chats, messages))
    }

    fn parse_search_result(
        &self,
        row: &UIElement,
        position: usize,
    ) -> Result<Option<SearchResultEntry>, AutomationError> {
        let kind = match row.identifier()?.as_deref() {
            Some(ids::SEARCH_CHAT_RESULT) => SearchRowKind::Chat,
            _ => SearchRowKind::Message,
        };
        let Some(description) = row.description()? else {
            return Ok(None);
        };
        let Some(mut entry) = parse_search_row(&description, position, kind) else {
            debug!(position, %description, "skipping unparseable search row");
            return Ok(None);
        };
        entry.attachment = self.row_attachment(row)?;
        Ok(Some(entry))
    }

    fn row_attachment(&self, row: &UIElement) -> Result<Attachment, AutomationError> {
        for child in row.children()? {
            let Some(id) = child.identifier()? else {
                continue;
            };
            if id.contains(VISUAL_MEDIA_ID) || id.contains(NONVISUAL_MEDIA_ID) {
                let description = child.description()?.or(child.title()?);
                return Ok(classify_attachment(Some(&id), description.as_deref()));
            }
        }
        Ok(Attachment::default())
    }
}

fn chat_entry_from_result(result: &SearchResultEntry) -> Option<ChatEntry> {
    Some(ChatEntry {
        name: result.chat_name.clone()?,
        last_message_preview: result.snippet.clone().unwrap_or_default(),
        timestamp: result.date.clone(),
        sender_for_groups: result.sender.clone(),
        pinned: false,
        is_group: result.sender.is_some(),
        unread: false,
        unread_count: None,
        list_position: result.list_position,
        source: ChatListSource::SearchResults,
    })
}
