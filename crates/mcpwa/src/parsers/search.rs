//! Rows of the global search panel.
//!
//! ```text
//! chat result:     chat_name[, snippet][, date]
//! message result:  chat_name, [You: | sender: ]snippet[, date]
//! ```
//!
//! Message results whose snippet is a photo placeholder or a URL are classified as photo and
//! link results. Attachments are read off the row's child button identifier.

use super::tokens::{
    NONVISUAL_MEDIA_ID, PHOTO_SNIPPETS, SELF_SENDER, URL_MARKERS, VISUAL_MEDIA_ID,
};
use super::{
    is_clock_or_date, is_timestamp, is_timestamp_fragment, join_segments, split_segments,
    split_sender,
};
use crate::types::{Attachment, AttachmentKind, SearchResultEntry, SearchResultKind};

/// Which section of the search panel a row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchRowKind {
    Chat,
    Message,
}

fn looks_like_url(text: &str) -> bool {
    let text = text.trim();
    URL_MARKERS.iter().any(|marker| text.contains(marker)) && !text.contains(' ')
}

/// Parse one search result row at `position` in the panel.
pub fn parse_search_row(
    description: &str,
    position: usize,
    kind: SearchRowKind,
) -> Option<SearchResultEntry> {
    let segments = split_segments(description.trim());
    if segments.iter().any(String::is_empty) {
        return None;
    }
    let chat_name = segments.first()?;
    if is_timestamp(chat_name) || is_timestamp_fragment(chat_name) {
        return None;
    }

    let mut end = segments.len();
    let mut date = None;
    if end > 1 && is_timestamp(&segments[end - 1]) {
        date = Some(segments[end - 1].clone());
        end -= 1;
    }
    let body = &segments[1..end];
    if body.iter().any(|s| is_clock_or_date(s) || is_timestamp_fragment(s)) {
        return None;
    }

    let mut entry = SearchResultEntry {
        kind: SearchResultKind::Message,
        list_position: position,
        chat_name: Some(chat_name.clone()),
        sender: None,
        snippet: None,
        date,
        is_outgoing: false,
        attachment: Attachment::default(),
    };

    match kind {
        SearchRowKind::Chat => {
            entry.kind = SearchResultKind::Chat;
            if !body.is_empty() {
                entry.snippet = Some(join_segments(body));
            }
        }
        SearchRowKind::Message => {
            if body.is_empty() {
                return None;
            }
            let body = join_segments(body);
            let snippet = match split_sender(&body) {
                Some((sender, snippet)) if sender == SELF_SENDER => {
                    entry.is_outgoing = true;
                    snippet.to_string()
                }
                Some((sender, snippet)) => {
                    entry.sender = Some(sender.to_string());
                    snippet.to_string()
                }
                None => body,
            };
            entry.kind = if PHOTO_SNIPPETS.contains(&snippet.as_str()) {
                SearchResultKind::Photo
            } else if looks_like_url(&snippet) {
                SearchResultKind::Link
            } else {
                SearchResultKind::Message
            };
            entry.snippet = Some(snippet);
        }
    }

    Some(entry)
}

/// Classify an attachment from the identifier and description of a result row's child button.
pub fn classify_attachment(identifier: Option<&str>, description: Option<&str>) -> Attachment {
    let description = description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);
    let kind = match identifier {
        Some(id) if id.contains(VISUAL_MEDIA_ID) && !id.contains(NONVISUAL_MEDIA_ID) => {
            AttachmentKind::Image
        }
        Some(id) if id.contains(NONVISUAL_MEDIA_ID) => {
            if description.as_deref().is_some_and(looks_like_url) {
                AttachmentKind::Link
            } else {
                AttachmentKind::Document
            }
        }
        _ => return Attachment::default(),
    };
    Attachment { kind, description }
}
