//! Chat list rows.
//!
//! Grammar, segments separated by `", "`:
//!
//! ```text
//! name, [sender: ]preview[, timestamp][, flag]*
//! flag := Pinned | Unread | Muted | Group | <n> unread message(s)
//! ```

use super::tokens::{
    FLAG_GROUP, FLAG_MUTED, FLAG_PINNED, FLAG_UNREAD, UNREAD_COUNT_MANY, UNREAD_COUNT_ONE,
};
use super::{
    is_clock_or_date, is_timestamp, is_timestamp_fragment, join_segments, split_segments,
    split_sender,
};
use crate::types::{ChatEntry, ChatListSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowFlag {
    Pinned,
    Unread,
    UnreadCount(u32),
    Muted,
    Group,
}

fn parse_flag(segment: &str) -> Option<RowFlag> {
    match segment {
        FLAG_PINNED => return Some(RowFlag::Pinned),
        FLAG_UNREAD => return Some(RowFlag::Unread),
        FLAG_MUTED => return Some(RowFlag::Muted),
        FLAG_GROUP => return Some(RowFlag::Group),
        _ => {}
    }
    let count = segment
        .strip_suffix(UNREAD_COUNT_MANY)
        .or_else(|| segment.strip_suffix(UNREAD_COUNT_ONE))?;
    count.trim().parse().ok().map(RowFlag::UnreadCount)
}

/// Parse the description of one chat list row at `position` in its list.
pub fn parse_chat_row(
    description: &str,
    position: usize,
    source: ChatListSource,
) -> Option<ChatEntry> {
    let segments = split_segments(description.trim());
    if segments.len() < 2 || segments.iter().any(String::is_empty) {
        return None;
    }

    let name = segments[0].as_str();
    if is_timestamp(name) || parse_flag(name).is_some() {
        return None;
    }

    let mut end = segments.len();
    let mut flags = Vec::new();
    while end > 2 {
        match parse_flag(&segments[end - 1]) {
            Some(flag) => {
                flags.push(flag);
                end -= 1;
            }
            None => break,
        }
    }

    let mut timestamp = None;
    if end > 2 && is_timestamp(&segments[end - 1]) {
        timestamp = Some(segments[end - 1].clone());
        end -= 1;
    }

    let body = &segments[1..end];
    let first = body.first()?;
    let last = body.last()?;
    // A flag or clock time leading the body means the segments arrived out of order.
    if parse_flag(first).is_some() || is_clock_or_date(first) || is_timestamp_fragment(last) {
        return None;
    }
    if body.iter().any(|segment| parse_flag(segment).is_some()) {
        return None;
    }

    let body = join_segments(body);
    let (sender, preview) = match split_sender(&body) {
        Some((sender, preview)) => (Some(sender.to_string()), preview.to_string()),
        None => (None, body),
    };

    let unread_count = flags.iter().find_map(|flag| match flag {
        RowFlag::UnreadCount(n) => Some(*n),
        _ => None,
    });

    Some(ChatEntry {
        name: name.to_string(),
        last_message_preview: preview,
        timestamp,
        is_group: sender.is_some() || flags.contains(&RowFlag::Group),
        sender_for_groups: sender,
        pinned: flags.contains(&RowFlag::Pinned),
        unread: unread_count.is_some() || flags.contains(&RowFlag::Unread),
        unread_count,
        list_position: position,
        source,
    })
}
