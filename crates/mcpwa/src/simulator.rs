//! Scripted stand-in for the WhatsApp desktop client.
//!
//! Keeps a small model of the client (chats, filter, tab, search query, focus, open chat) and
//! renders it into a [`MemoryEngine`] tree with the same identifiers and description strings
//! the real client exposes. Synthetic input drives the model the way the client reacts to it.
//! Every render replaces the whole tree, so element handles go stale on each change.
//!
//! Options reproduce the awkward parts of the real client: redraws that land only after a few
//! reads, an application that is not running, and sends that never show up.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::automation::{ids, AutomationConfig, WhatsApp};
use crate::element::role;
use crate::input::{Key, Modifiers};
use crate::parsers::tokens::{
    FLAG_GROUP, FLAG_MUTED, FLAG_PINNED, INCOMING_FROM_PREFIX, INCOMING_PREFIX,
    NONVISUAL_MEDIA_ID, OUTGOING_PREFIX, REACTIONS_PREFIX, RECEIPT_DELIVERED, RECEIPT_READ,
    RECEIPT_SENT, REPLY_PREFIX, SEGMENT_SEP, SELF_SENDER, SENDER_SEP, SYSTEM_PREFIX,
    UNREAD_COUNT_MANY, UNREAD_COUNT_ONE, VISUAL_MEDIA_ID,
};
use crate::platforms::memory::{InputEvent, InputHandler, MemoryEngine, MemoryTree, NodeSpec};
use crate::platforms::AccessibilityEngine;
use crate::types::{AttachmentKind, ChatFilter, MessageDirection, ReadReceipt, Tab};
use crate::utils::normalize;

/// One message in a simulated conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct SimMessage {
    pub direction: MessageDirection,
    pub sender: Option<String>,
    pub text: String,
    pub timestamp: Option<String>,
    pub receipt: Option<ReadReceipt>,
    pub reply_to: Option<(String, String)>,
    pub reactions: Vec<String>,
    pub attachment: Option<(AttachmentKind, String)>,
}

impl SimMessage {
    fn new(direction: MessageDirection, text: &str, timestamp: Option<&str>) -> Self {
        Self {
            direction,
            sender: None,
            text: text.to_string(),
            timestamp: timestamp.map(str::to_string),
            receipt: None,
            reply_to: None,
            reactions: Vec::new(),
            attachment: None,
        }
    }

    pub fn incoming(text: &str, timestamp: &str) -> Self {
        Self::new(MessageDirection::Incoming, text, Some(timestamp))
    }

    /// Incoming message in a group, attributed to `sender`.
    pub fn member(sender: &str, text: &str, timestamp: &str) -> Self {
        Self {
            sender: Some(sender.to_string()),
            ..Self::incoming(text, timestamp)
        }
    }

    pub fn outgoing(text: &str, timestamp: &str) -> Self {
        Self {
            receipt: Some(ReadReceipt::Read),
            ..Self::new(MessageDirection::Outgoing, text, Some(timestamp))
        }
    }

    pub fn system(text: &str) -> Self {
        Self::new(MessageDirection::System, text, None)
    }

    pub fn replying_to(mut self, sender: &str, quote: &str) -> Self {
        self.reply_to = Some((sender.to_string(), quote.to_string()));
        self
    }

    pub fn with_reactions(mut self, reactions: &[&str]) -> Self {
        self.reactions = reactions.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_attachment(mut self, kind: AttachmentKind, description: &str) -> Self {
        self.attachment = Some((kind, description.to_string()));
        self
    }

    fn bubble_description(&self) -> String {
        let mut segments = Vec::new();
        match self.direction {
            MessageDirection::System => {
                return format!("{SYSTEM_PREFIX}{SEGMENT_SEP}{}", self.text);
            }
            MessageDirection::Outgoing => segments.push(OUTGOING_PREFIX.to_string()),
            MessageDirection::Incoming => match &self.sender {
                Some(sender) => segments.push(format!("{INCOMING_FROM_PREFIX}{sender}")),
                None => segments.push(INCOMING_PREFIX.to_string()),
            },
        }
        if let Some((who, quote)) = &self.reply_to {
            segments.push(format!(
                "{REPLY_PREFIX}{who}{SENDER_SEP}\u{201C}{quote}\u{201D}"
            ));
        }
        segments.push(self.text.clone());
        if let Some(timestamp) = &self.timestamp {
            segments.push(timestamp.clone());
        }
        if self.direction == MessageDirection::Outgoing {
            if let Some(receipt) = self.receipt {
                segments.push(receipt_token(receipt).to_string());
            }
        }
        if !self.reactions.is_empty() {
            segments.push(format!("{REACTIONS_PREFIX}{}", self.reactions.join(" ")));
        }
        segments.join(SEGMENT_SEP)
    }
}

fn receipt_token(receipt: ReadReceipt) -> &'static str {
    match receipt {
        ReadReceipt::Sent => RECEIPT_SENT,
        ReadReceipt::Delivered => RECEIPT_DELIVERED,
        ReadReceipt::Read => RECEIPT_READ,
    }
}

/// One conversation in the simulated client.
#[derive(Debug, Clone, PartialEq)]
pub struct SimChat {
    pub name: String,
    pub is_group: bool,
    pub pinned: bool,
    pub muted: bool,
    pub favorite: bool,
    pub unread_count: u32,
    pub last_seen: Option<String>,
    pub messages: Vec<SimMessage>,
}

impl SimChat {
    pub fn direct(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_group: false,
            pinned: false,
            muted: false,
            favorite: false,
            unread_count: 0,
            last_seen: None,
            messages: Vec::new(),
        }
    }

    pub fn group(name: &str) -> Self {
        Self {
            is_group: true,
            ..Self::direct(name)
        }
    }

    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }

    pub fn muted(mut self) -> Self {
        self.muted = true;
        self
    }

    pub fn favorite(mut self) -> Self {
        self.favorite = true;
        self
    }

    pub fn unread(mut self, count: u32) -> Self {
        self.unread_count = count;
        self
    }

    pub fn last_seen(mut self, text: &str) -> Self {
        self.last_seen = Some(text.to_string());
        self
    }

    pub fn message(mut self, message: SimMessage) -> Self {
        self.messages.push(message);
        self
    }

    fn passes(&self, filter: ChatFilter) -> bool {
        match filter {
            ChatFilter::All => true,
            ChatFilter::Unread => self.unread_count > 0,
            ChatFilter::Favorites => self.favorite,
            ChatFilter::Groups => self.is_group,
        }
    }

    /// `sender: text` prefix as the chat list and search panel show it.
    fn attributed(&self, message: &SimMessage) -> String {
        match (message.direction, &message.sender) {
            (MessageDirection::Outgoing, _) if self.is_group => {
                format!("{SELF_SENDER}{SENDER_SEP}{}", message.text)
            }
            (MessageDirection::Incoming, Some(sender)) if self.is_group => {
                format!("{sender}{SENDER_SEP}{}", message.text)
            }
            _ => message.text.clone(),
        }
    }

    fn row_description(&self) -> String {
        let mut segments = vec![self.name.clone()];
        let Some(last) = self.messages.last() else {
            return self.name.clone();
        };
        let preview = self.attributed(last);
        let has_sender = preview != last.text;
        segments.push(preview);
        if let Some(timestamp) = &last.timestamp {
            segments.push(timestamp.clone());
        }
        if self.pinned {
            segments.push(FLAG_PINNED.to_string());
        }
        match self.unread_count {
            0 => {}
            1 => segments.push(format!("1{UNREAD_COUNT_ONE}")),
            n => segments.push(format!("{n}{UNREAD_COUNT_MANY}")),
        }
        if self.muted {
            segments.push(FLAG_MUTED.to_string());
        }
        if self.is_group && !has_sender {
            segments.push(FLAG_GROUP.to_string());
        }
        segments.join(SEGMENT_SEP)
    }
}

/// Knobs for the awkward behaviours of the real client.
#[derive(Debug, Clone, Default)]
pub struct SimulatorOptions {
    /// Number of tree reads after an input before the redraw becomes visible.
    pub redraw_lag: u32,
    /// Outgoing messages are swallowed instead of appearing in the conversation.
    pub drop_outgoing: bool,
    /// Clicks on the chat filter toggles have no effect.
    pub frozen_filters: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    None,
    Search,
    Compose,
}

#[derive(Debug)]
struct SimState {
    chats: Vec<SimChat>,
    filter: ChatFilter,
    tab: Tab,
    query: String,
    focus: Focus,
    compose: String,
    open: Option<String>,
    select_all: bool,
    options: SimulatorOptions,
    pending_reads: Option<u32>,
    chat_rows: Vec<String>,
    search_rows: Vec<String>,
    clock_minutes: u32,
}

impl SimState {
    fn chat_mut(&mut self, name: &str) -> Option<&mut SimChat> {
        self.chats.iter_mut().find(|c| c.name == name)
    }

    fn visible_chats(&self) -> Vec<&SimChat> {
        let mut chats: Vec<&SimChat> = self
            .chats
            .iter()
            .filter(|c| c.passes(self.filter))
            .collect();
        chats.sort_by_key(|c| !c.pinned);
        chats
    }

    fn open_chat(&mut self, name: &str) {
        if let Some(chat) = self.chat_mut(name) {
            chat.unread_count = 0;
            self.open = Some(name.to_string());
            self.compose.clear();
        }
    }

    fn tick(&mut self) -> String {
        self.clock_minutes += 1;
        format!(
            "{:02}:{:02}",
            (self.clock_minutes / 60) % 24,
            self.clock_minutes % 60
        )
    }

    fn edit_target(&mut self) -> Option<&mut String> {
        match self.focus {
            Focus::Search => Some(&mut self.query),
            Focus::Compose if self.open.is_some() => Some(&mut self.compose),
            _ => None,
        }
    }

    fn send(&mut self) {
        let text = self.compose.trim().to_string();
        self.compose.clear();
        if text.is_empty() || self.options.drop_outgoing {
            return;
        }
        let timestamp = self.tick();
        let Some(open) = self.open.clone() else {
            return;
        };
        if let Some(chat) = self.chat_mut(&open) {
            let mut message = SimMessage::outgoing(&text, &timestamp);
            message.receipt = Some(ReadReceipt::Sent);
            chat.messages.push(message);
        }
    }

    fn apply(&mut self, tree: &MemoryTree, event: &InputEvent) {
        match event {
            InputEvent::Click { node } | InputEvent::Focus { node } => {
                let is_click = matches!(event, InputEvent::Click { .. });
                let identifier = tree.identifier(*node).map(str::to_string);
                let position = tree.index_in_parent(*node);
                self.select_all = false;
                self.on_press(identifier.as_deref(), position, is_click);
            }
            InputEvent::Key { key, modifiers } => self.on_key(*key, *modifiers),
            InputEvent::Text(text) => {
                let replace = std::mem::take(&mut self.select_all);
                if let Some(target) = self.edit_target() {
                    if replace {
                        target.clear();
                    }
                    target.push_str(text);
                }
            }
        }
    }

    fn on_press(&mut self, identifier: Option<&str>, position: Option<usize>, is_click: bool) {
        let Some(identifier) = identifier else {
            return;
        };
        match identifier {
            ids::SEARCH_FIELD => self.focus = Focus::Search,
            ids::COMPOSE_FIELD => self.focus = Focus::Compose,
            ids::CHAT_LIST_ROW if is_click => {
                if let Some(name) = position.and_then(|p| self.chat_rows.get(p)).cloned() {
                    self.focus = Focus::Compose;
                    self.open_chat(&name);
                }
            }
            ids::SEARCH_CHAT_RESULT | ids::SEARCH_MESSAGE_RESULT if is_click => {
                if let Some(name) = position.and_then(|p| self.search_rows.get(p)).cloned() {
                    self.focus = Focus::Compose;
                    self.open_chat(&name);
                }
            }
            other if is_click => {
                if let Some(filter) = ChatFilter::ALL
                    .into_iter()
                    .find(|f| ids::filter_button(*f) == other)
                {
                    if !self.options.frozen_filters {
                        self.filter = filter;
                    }
                } else if let Some(tab) = [Tab::Chats, Tab::Calls, Tab::Archived, Tab::Settings]
                    .into_iter()
                    .find(|t| ids::tab_button(*t) == other)
                {
                    self.tab = tab;
                }
            }
            _ => {}
        }
    }

    fn on_key(&mut self, key: Key, modifiers: Modifiers) {
        match key {
            Key::A if modifiers.contains(Modifiers::COMMAND) => {
                self.select_all = true;
                return;
            }
            Key::Delete => {
                let clear = self.select_all;
                if let Some(target) = self.edit_target() {
                    if clear {
                        target.clear();
                    } else {
                        target.pop();
                    }
                }
            }
            Key::Escape => {
                if self.focus == Focus::Search || !self.query.is_empty() {
                    self.query.clear();
                    self.focus = Focus::None;
                }
            }
            Key::Return if self.focus == Focus::Compose && self.open.is_some() => self.send(),
            _ => {}
        }
        self.select_all = false;
    }

    fn render(&mut self) -> NodeSpec {
        let mut window = NodeSpec::new(role::WINDOW).title("WhatsApp");

        window = window.child(
            NodeSpec::new(role::GROUP).identifier(ids::TAB_BAR).children(
                [Tab::Chats, Tab::Calls, Tab::Archived, Tab::Settings].map(|tab| {
                    NodeSpec::new(role::RADIO_BUTTON)
                        .identifier(ids::tab_button(tab))
                        .selected(tab == self.tab)
                }),
            ),
        );

        self.chat_rows.clear();
        self.search_rows.clear();

        if self.tab == Tab::Chats {
            window = window.child(
                NodeSpec::new(role::TEXT_FIELD)
                    .identifier(ids::SEARCH_FIELD)
                    .value(&self.query)
                    .focused(self.focus == Focus::Search),
            );
            if self.query.trim().is_empty() {
                window = window
                    .child(self.render_filters())
                    .child(self.render_chat_list());
            } else {
                window = window.child(self.render_search());
            }
        }

        if let Some(open) = self.open.clone() {
            if let Some(chat) = self.chats.iter().find(|c| c.name == open) {
                let mut header = NodeSpec::new(role::GROUP).identifier(ids::HEADER).child(
                    NodeSpec::new(role::STATIC_TEXT)
                        .identifier(ids::HEADER_TITLE)
                        .value(&chat.name),
                );
                if let Some(last_seen) = &chat.last_seen {
                    header = header.child(
                        NodeSpec::new(role::STATIC_TEXT)
                            .identifier(ids::HEADER_SUBTITLE)
                            .value(last_seen),
                    );
                }
                let bubbles = chat.messages.iter().map(|m| {
                    NodeSpec::new(role::GENERIC_ELEMENT)
                        .identifier(ids::MESSAGE_BUBBLE)
                        .description(&m.bubble_description())
                });
                window = window
                    .child(header)
                    .child(
                        NodeSpec::new(role::LIST)
                            .identifier(ids::MESSAGE_LIST)
                            .children(bubbles),
                    )
                    .child(
                        NodeSpec::new(role::TEXT_AREA)
                            .identifier(ids::COMPOSE_FIELD)
                            .value(&self.compose)
                            .focused(self.focus == Focus::Compose),
                    );
            }
        }

        NodeSpec::new(role::APPLICATION).title("WhatsApp").child(window)
    }

    fn render_filters(&self) -> NodeSpec {
        NodeSpec::new(role::GROUP)
            .identifier(ids::FILTER_BAR)
            .children(ChatFilter::ALL.map(|filter| {
                NodeSpec::new(role::RADIO_BUTTON)
                    .identifier(ids::filter_button(filter))
                    .title(filter.as_str())
                    .selected(filter == self.filter)
            }))
    }

    fn render_chat_list(&mut self) -> NodeSpec {
        let rows: Vec<(String, String)> = self
            .visible_chats()
            .into_iter()
            .map(|c| (c.name.clone(), c.row_description()))
            .collect();
        let mut list = NodeSpec::new(role::TABLE).identifier(ids::CHAT_LIST);
        for (name, description) in rows {
            self.chat_rows.push(name);
            list = list.child(
                NodeSpec::new(role::CELL)
                    .identifier(ids::CHAT_LIST_ROW)
                    .description(&description),
            );
        }
        list
    }

    fn render_search(&mut self) -> NodeSpec {
        let query = normalize(&self.query);
        let mut rows: Vec<(String, NodeSpec)> = Vec::new();

        for chat in &self.chats {
            if normalize(&chat.name).contains(&query) {
                rows.push((
                    chat.name.clone(),
                    NodeSpec::new(role::CELL)
                        .identifier(ids::SEARCH_CHAT_RESULT)
                        .description(&chat.name),
                ));
            }
        }
        for chat in &self.chats {
            for message in &chat.messages {
                if message.direction == MessageDirection::System
                    || !normalize(&message.text).contains(&query)
                {
                    continue;
                }
                let mut segments = vec![chat.name.clone(), chat.attributed(message)];
                if message.direction == MessageDirection::Outgoing && !chat.is_group {
                    segments[1] = format!("{SELF_SENDER}{SENDER_SEP}{}", message.text);
                }
                if let Some(timestamp) = &message.timestamp {
                    segments.push(timestamp.clone());
                }
                let mut row = NodeSpec::new(role::CELL)
                    .identifier(ids::SEARCH_MESSAGE_RESULT)
                    .description(&segments.join(SEGMENT_SEP));
                if let Some((kind, description)) = &message.attachment {
                    let id = match kind {
                        AttachmentKind::Image => Some(VISUAL_MEDIA_ID),
                        AttachmentKind::Link | AttachmentKind::Document => {
                            Some(NONVISUAL_MEDIA_ID)
                        }
                        AttachmentKind::None => None,
                    };
                    if let Some(id) = id {
                        row = row.child(
                            NodeSpec::new(role::BUTTON)
                                .identifier(id)
                                .description(description),
                        );
                    }
                }
                rows.push((chat.name.clone(), row));
            }
        }

        let mut view = NodeSpec::new(role::LIST).identifier(ids::SEARCH_VIEW);
        for (name, row) in rows {
            self.search_rows.push(name);
            view = view.child(row);
        }
        view
    }
}

struct SimHandler {
    state: Mutex<SimState>,
}

impl SimHandler {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl InputHandler for SimHandler {
    fn handle(&self, tree: &mut MemoryTree, event: &InputEvent) {
        let mut state = self.lock();
        state.apply(tree, event);
        if state.options.redraw_lag == 0 {
            let spec = state.render();
            tree.replace(spec);
        } else {
            state.pending_reads = Some(state.options.redraw_lag);
        }
    }

    fn before_read(&self, tree: &mut MemoryTree) {
        let mut state = self.lock();
        match state.pending_reads {
            Some(n) if n <= 1 => {
                state.pending_reads = None;
                let spec = state.render();
                tree.replace(spec);
            }
            Some(n) => state.pending_reads = Some(n - 1),
            None => {}
        }
    }
}

/// A simulated WhatsApp client behind a [`MemoryEngine`].
#[derive(Clone)]
pub struct WhatsAppSimulator {
    engine: MemoryEngine,
    handler: Arc<SimHandler>,
}

impl WhatsAppSimulator {
    pub fn new(chats: Vec<SimChat>) -> Self {
        Self::with_options(chats, SimulatorOptions::default())
    }

    pub fn with_options(chats: Vec<SimChat>, options: SimulatorOptions) -> Self {
        let handler = Arc::new(SimHandler {
            state: Mutex::new(SimState {
                chats,
                filter: ChatFilter::All,
                tab: Tab::Chats,
                query: String::new(),
                focus: Focus::None,
                compose: String::new(),
                open: None,
                select_all: false,
                options,
                pending_reads: None,
                chat_rows: Vec::new(),
                search_rows: Vec::new(),
                clock_minutes: 12 * 60,
            }),
        });
        let engine = MemoryEngine::new();
        engine.set_handler(handler.clone());
        let simulator = Self { engine, handler };
        simulator.update(|_| {});
        simulator
    }

    pub fn engine(&self) -> Arc<dyn AccessibilityEngine> {
        Arc::new(self.engine.clone())
    }

    pub fn memory_engine(&self) -> &MemoryEngine {
        &self.engine
    }

    /// A [`WhatsApp`] driver over this simulator with no-wait polling.
    pub fn whatsapp(&self) -> WhatsApp {
        WhatsApp::new(self.engine(), AutomationConfig::immediate())
    }

    pub fn set_available(&self, available: bool) {
        self.engine.set_available(available);
    }

    /// Mutate the model outside of synthetic input and redraw immediately.
    fn update<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        self.engine.with_tree_mut(|tree| {
            let mut state = self.handler.lock();
            let result = f(&mut state);
            state.pending_reads = None;
            let spec = state.render();
            tree.replace(spec);
            result
        })
    }

    /// Deliver `message` into `chat`, as if it arrived from the network.
    pub fn receive(&self, chat: &str, message: SimMessage) {
        self.update(|state| {
            let is_open = state.open.as_deref() == Some(chat);
            if let Some(target) = state.chat_mut(chat) {
                target.messages.push(message);
                if !is_open {
                    target.unread_count += 1;
                }
            }
        });
    }

    /// Put the client into search mode with `query` already typed.
    pub fn type_search(&self, query: &str) {
        self.update(|state| {
            state.query = query.to_string();
            state.focus = Focus::Search;
        });
    }

    pub fn open(&self, chat: &str) {
        self.update(|state| state.open_chat(chat));
    }

    pub fn open_chat_name(&self) -> Option<String> {
        self.handler.lock().open.clone()
    }

    pub fn query(&self) -> String {
        self.handler.lock().query.clone()
    }

    pub fn filter(&self) -> ChatFilter {
        self.handler.lock().filter
    }

    pub fn tab(&self) -> Tab {
        self.handler.lock().tab
    }

    pub fn messages(&self, chat: &str) -> Vec<SimMessage> {
        let state = self.handler.lock();
        state
            .chats
            .iter()
            .find(|c| c.name == chat)
            .map(|c| c.messages.clone())
            .unwrap_or_default()
    }
}

/// Three chats: a pinned direct chat, a group with unread messages and a muted direct chat.
pub fn sample_chats() -> Vec<SimChat> {
    vec![
        SimChat::direct("Alice")
            .pinned()
            .favorite()
            .last_seen("online")
            .message(SimMessage::incoming("lunch today?", "11:58"))
            .message(SimMessage::outgoing("sure, 12:30 works", "11:59")),
        SimChat::group("Team")
            .unread(2)
            .message(SimMessage::system("Alice added Bob"))
            .message(SimMessage::member("Bob", "standup moved", "09:10"))
            .message(SimMessage::member("Carol", "deploy is done", "09:15")),
        SimChat::direct("Bob")
            .muted()
            .message(
                SimMessage::incoming("https://example.com/doc", "Yesterday")
                    .with_attachment(AttachmentKind::Link, "https://example.com/doc"),
            )
            .message(
                SimMessage::incoming("Photo", "Yesterday")
                    .with_attachment(AttachmentKind::Image, "beach.jpg"),
            ),
    ]
}
