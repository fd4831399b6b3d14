use tracing::{debug, info, instrument, warn};

use super::{ids, WhatsApp};
use crate::errors::AutomationError;
use crate::input::{Key, Modifiers};
use crate::parsers::{parse_last_seen, parse_message};
use crate::selector::Selector;
use crate::types::{CurrentChat, MessageDirection, MessageEntry};

impl WhatsApp {
    /// Snapshot of the open conversation, or `None` when no chat is open.
    #[instrument(skip(self))]
    pub fn current_chat(&self) -> Result<Option<CurrentChat>, AutomationError> {
        self.ensure_ready()?;
        let Some(name) = self.current_chat_name()? else {
            return Ok(None);
        };
        let last_seen_text = match self.find(ids::HEADER)? {
            Some(header) => match self
                .locate(header, Selector::id(ids::HEADER_SUBTITLE))
                .try_first()?
            {
                Some(subtitle) => subtitle
                    .value()?
                    .or(subtitle.title()?)
                    .as_deref()
                    .and_then(parse_last_seen),
                None => None,
            },
            None => None,
        };
        let messages = self.read_messages()?;
        Ok(Some(CurrentChat {
            name,
            last_seen_text,
            messages,
        }))
    }

    /// Messages of the open conversation, oldest first. With `limit`, only the newest
    /// `limit` messages are kept.
    pub fn messages(&self, limit: Option<usize>) -> Result<Vec<MessageEntry>, AutomationError> {
        self.ensure_ready()?;
        let mut messages = self.read_messages()?;
        if let Some(limit) = limit {
            let skip = messages.len().saturating_sub(limit);
            messages.drain(..skip);
        }
        Ok(messages)
    }

    fn read_messages(&self) -> Result<Vec<MessageEntry>, AutomationError> {
        let Some(list) = self.find(ids::MESSAGE_LIST)? else {
            return Ok(Vec::new());
        };
        let mut messages = Vec::new();
        for bubble in list.children()? {
            let Some(description) = bubble.description()? else {
                continue;
            };
            match parse_message(&description) {
                Some(message) => messages.push(message),
                None => debug!(%description, "skipping unparseable message bubble"),
            }
        }
        Ok(messages)
    }

    /// Type `text` into the compose field of the open chat and press Return.
    ///
    /// Success means an outgoing message with exactly this text showed up among the newest
    /// messages after the send; other messages arriving meanwhile do not matter. `false` when
    /// it never did within the configured bound.
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub fn send_message(&self, text: &str) -> Result<bool, AutomationError> {
        if text.trim().is_empty() {
            return Err(AutomationError::InvalidArgument(
                "message text must not be empty".to_string(),
            ));
        }
        self.ensure_ready()?;
        let before = count_outgoing(&self.read_messages()?, text);
        self.require(ids::COMPOSE_FIELD)?.click()?;
        self.replace_text(text)?;
        self.press(Key::Return, Modifiers::NONE)?;
        self.settle();

        let window = self.config.send_verify_window;
        let delivered = self.config.send_verify.poll("sent message visible", || {
            let messages = self.read_messages()?;
            let tail = &messages[messages.len().saturating_sub(window)..];
            Ok(count_outgoing(&messages, text) > before && count_outgoing(tail, text) > 0)
        })?;
        if delivered {
            info!("message sent");
        } else {
            warn!("sent message never appeared in the conversation");
        }
        Ok(delivered)
    }
}

fn count_outgoing(messages: &[MessageEntry], text: &str) -> usize {
    let text = text.trim();
    messages
        .iter()
        .filter(|m| m.direction == MessageDirection::Outgoing && m.text.trim() == text)
        .count()
}
