//! Parsers for the accessibility description strings WhatsApp puts on list rows, message
//! bubbles, search results and the conversation header.
//!
//! Every parser is total: input that does not fit the expected shape yields `None`. A `None`
//! row is skipped by the caller, never reported as a half-filled record.

pub mod chat;
pub mod header;
pub mod message;
pub mod search;
pub mod tokens;

pub use chat::parse_chat_row;
pub use header::{parse_header_title, parse_last_seen};
pub use message::parse_message;
pub use search::{classify_attachment, parse_search_row, SearchRowKind};

use tokens::{
    DATE_RE, QUOTE_PAIRS, RELATIVE_DAYS, SELF_SENDER, SENDER_SEP, TIMESTAMP_FRAGMENT_RE, TIME_RE,
    WEEKDAYS,
};

/// Split a description on `", "`, leaving separators inside quotes alone. Segments are trimmed.
pub(crate) fn split_segments(description: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut open_quote: Option<char> = None;
    let mut chars = description.chars().peekable();

    while let Some(c) = chars.next() {
        match open_quote {
            Some(close) if c == close => open_quote = None,
            Some(_) => {}
            None => {
                if let Some((_, close)) = QUOTE_PAIRS.iter().find(|(open, _)| *open == c) {
                    open_quote = Some(*close);
                } else if c == ',' && chars.peek() == Some(&' ') {
                    chars.next();
                    segments.push(current.trim().to_string());
                    current.clear();
                    continue;
                }
            }
        }
        current.push(c);
    }
    segments.push(current.trim().to_string());
    segments
}

pub(crate) fn join_segments(segments: &[String]) -> String {
    segments.join(tokens::SEGMENT_SEP)
}

/// Whether `segment` is one of the timestamp shapes the client renders.
pub fn is_timestamp(segment: &str) -> bool {
    let segment = segment.trim();
    if segment.is_empty() {
        return false;
    }
    if TIME_RE.is_match(segment) || DATE_RE.is_match(segment) {
        return true;
    }
    let (word, rest) = match segment.split_once(' ') {
        Some((word, rest)) => (word, Some(rest.trim_start_matches("at ").trim())),
        None => (segment, None),
    };
    let is_day_word = RELATIVE_DAYS.contains(&word) || WEEKDAYS.contains(&word);
    match rest {
        None => is_day_word,
        Some(time) => is_day_word && TIME_RE.is_match(time),
    }
}

/// A clock time or numeric date. Day words such as `Yesterday` are left out: they are also
/// ordinary message text.
pub(crate) fn is_clock_or_date(segment: &str) -> bool {
    let segment = segment.trim();
    TIME_RE.is_match(segment) || DATE_RE.is_match(segment)
}

/// A cut-off time or date that is not a whole timestamp.
pub(crate) fn is_timestamp_fragment(segment: &str) -> bool {
    TIMESTAMP_FRAGMENT_RE.is_match(segment) && !is_timestamp(segment)
}

/// Split a leading `"Sender: "` off `body`. The sender must look like a display name.
pub(crate) fn split_sender(body: &str) -> Option<(&str, &str)> {
    let (sender, rest) = body.split_once(SENDER_SEP)?;
    let sender = sender.trim();
    if rest.trim().is_empty() || !plausible_sender(sender) {
        return None;
    }
    Some((sender, rest.trim()))
}

fn plausible_sender(sender: &str) -> bool {
    if sender.is_empty() || sender.chars().count() > 64 {
        return false;
    }
    if sender == SELF_SENDER {
        return true;
    }
    !sender.contains(':') && !is_timestamp(sender) && !sender.contains("://")
}

/// Remove one pair of surrounding quotes, if present.
pub(crate) fn strip_quotes(text: &str) -> &str {
    let text = text.trim();
    for (open, close) in QUOTE_PAIRS {
        if let Some(inner) = text
            .strip_prefix(*open)
            .and_then(|rest| rest.strip_suffix(*close))
        {
            return inner;
        }
    }
    text
}
