//! Message bubbles in the open conversation.
//!
//! ```text
//! Your message, body                      outgoing
//! Message from <sender>, body             incoming, group
//! Message, body                           incoming, direct chat
//! System message, <text>                  system notice, no timestamp
//!
//! body := [Replying to <who>: "<quote>", ]text, timestamp[, Sent|Delivered|Read][, Reactions: r1 r2]
//! ```

use super::tokens::{
    INCOMING_FROM_PREFIX, INCOMING_PREFIX, OUTGOING_PREFIX, REACTIONS_PREFIX, RECEIPT_DELIVERED,
    RECEIPT_READ, RECEIPT_SENT, REPLY_PREFIX, SENDER_SEP, SYSTEM_PREFIX,
};
use super::{is_timestamp, join_segments, split_segments, strip_quotes};
use crate::types::{MessageDirection, MessageEntry, ReadReceipt};

fn parse_receipt(segment: &str) -> Option<ReadReceipt> {
    match segment {
        RECEIPT_SENT => Some(ReadReceipt::Sent),
        RECEIPT_DELIVERED => Some(ReadReceipt::Delivered),
        RECEIPT_READ => Some(ReadReceipt::Read),
        _ => None,
    }
}

fn segment_before(segments: &[String], end: usize) -> Option<&String> {
    end.checked_sub(1).and_then(|i| segments.get(i))
}

fn parse_reply(segment: &str) -> Option<(String, String)> {
    let rest = segment.strip_prefix(REPLY_PREFIX)?;
    let (who, quote) = rest.split_once(SENDER_SEP)?;
    let who = who.trim();
    let quote = strip_quotes(quote);
    if who.is_empty() || quote.is_empty() {
        return None;
    }
    Some((who.to_string(), quote.to_string()))
}

/// Parse the description of one message bubble.
pub fn parse_message(description: &str) -> Option<MessageEntry> {
    let segments = split_segments(description.trim());
    let (head, rest) = segments.split_first()?;

    let (direction, sender) = if head == OUTGOING_PREFIX {
        (MessageDirection::Outgoing, None)
    } else if head == SYSTEM_PREFIX {
        return parse_system(rest);
    } else if head == INCOMING_PREFIX {
        (MessageDirection::Incoming, None)
    } else if let Some(sender) = head.strip_prefix(INCOMING_FROM_PREFIX) {
        let sender = sender.trim();
        if sender.is_empty() {
            return None;
        }
        (MessageDirection::Incoming, Some(sender.to_string()))
    } else {
        return None;
    };

    let mut end = rest.len();

    let mut reactions = Vec::new();
    if let Some(list) = segment_before(rest, end).and_then(|s| s.strip_prefix(REACTIONS_PREFIX)) {
        reactions = list.split_whitespace().map(str::to_string).collect();
        if reactions.is_empty() {
            return None;
        }
        end -= 1;
    }

    let mut read_receipt = None;
    if let Some(receipt) = segment_before(rest, end).and_then(|s| parse_receipt(s)) {
        if direction != MessageDirection::Outgoing {
            return None;
        }
        read_receipt = Some(receipt);
        end -= 1;
    }

    let timestamp = segment_before(rest, end).filter(|s| is_timestamp(s))?;
    end -= 1;

    let mut start = 0;
    let mut reply = None;
    if let Some(segment) = rest.first().filter(|s| s.starts_with(REPLY_PREFIX)) {
        reply = Some(parse_reply(segment)?);
        start = 1;
    }

    if start >= end {
        return None;
    }
    let text_segments = &rest[start..end];
    if text_segments.iter().any(|s| {
        s.is_empty() || parse_receipt(s).is_some() || s.starts_with(REACTIONS_PREFIX)
    }) {
        return None;
    }

    let (reply_to_sender, reply_to_text) = match reply {
        Some((who, quote)) => (Some(who), Some(quote)),
        None => (None, None),
    };

    Some(MessageEntry {
        text: join_segments(text_segments),
        sender,
        timestamp: Some(timestamp.clone()),
        direction,
        reply_to_sender,
        reply_to_text,
        reactions,
        read_receipt,
    })
}

fn parse_system(rest: &[String]) -> Option<MessageEntry> {
    let text = join_segments(rest);
    if text.trim().is_empty() {
        return None;
    }
    Some(MessageEntry {
        text,
        sender: None,
        timestamp: None,
        direction: MessageDirection::System,
        reply_to_sender: None,
        reply_to_text: None,
        reactions: Vec::new(),
        read_receipt: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outgoing_with_receipt() {
        let message = parse_message("Your message, on my way, 18:52, Read").unwrap();
        assert_eq!(message.direction, MessageDirection::Outgoing);
        assert_eq!(message.text, "on my way");
        assert_eq!(message.timestamp.as_deref(), Some("18:52"));
        assert_eq!(message.read_receipt, Some(ReadReceipt::Read));
        assert_eq!(message.sender, None);
    }

    #[test]
    fn test_incoming_group_message_with_reply_and_reactions() {
        let message = parse_message(
            "Message from Bob, Replying to Alice: \u{201C}lunch, today?\u{201D}, sure, 12:01, Reactions: \u{1F44D} \u{2764}\u{FE0F}",
        )
        .unwrap();
        assert_eq!(message.direction, MessageDirection::Incoming);
        assert_eq!(message.sender.as_deref(), Some("Bob"));
        assert_eq!(message.reply_to_sender.as_deref(), Some("Alice"));
        assert_eq!(message.reply_to_text.as_deref(), Some("lunch, today?"));
        assert_eq!(message.text, "sure");
        assert_eq!(message.reactions, vec!["\u{1F44D}", "\u{2764}\u{FE0F}"]);
        assert_eq!(message.read_receipt, None);
    }

    #[test]
    fn test_incoming_direct_message_keeps_commas() {
        let message = parse_message("Message, one, two, three, 6:05 PM").unwrap();
        assert_eq!(message.text, "one, two, three");
        assert_eq!(message.sender, None);
        assert_eq!(message.timestamp.as_deref(), Some("6:05 PM"));
    }

    #[test]
    fn test_system_message() {
        let message = parse_message("System message, Alice added Bob").unwrap();
        assert_eq!(message.direction, MessageDirection::System);
        assert_eq!(message.text, "Alice added Bob");
        assert_eq!(message.timestamp, None);
        assert_eq!(parse_message("System message"), None);
    }

    #[test]
    fn test_truncated_bubbles_are_rejected() {
        assert_eq!(parse_message("Your message, on my way"), None);
        assert_eq!(parse_message("Your message, on my way, 18:5"), None);
        assert_eq!(parse_message("Your message"), None);
        assert_eq!(parse_message("Message from , hi, 10:00"), None);
        assert_eq!(parse_message("Message, 10:00"), None);
        assert_eq!(parse_message("Your message, Replying to Bob, ok, 10:00"), None);
    }

    #[test]
    fn test_reordered_bubbles_are_rejected() {
        assert_eq!(parse_message("18:52, Your message, hi"), None);
        assert_eq!(parse_message("Your message, 18:52, hi"), None);
        assert_eq!(parse_message("Your message, hi, Read, 18:52"), None);
        assert_eq!(parse_message("Message from Bob, hi, 10:00, Read"), None);
    }
}
