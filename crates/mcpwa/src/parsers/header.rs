//! Conversation header: the open chat's title and its presence subtitle.

use super::tokens::HEADER_NOISE;
use super::{split_segments, strip_quotes};
use crate::utils::normalize;

/// Chat name shown in the header. The title can carry a trailing status segment
/// (`"Alice, online"`); only the first segment is the name.
pub fn parse_header_title(title: &str) -> Option<String> {
    let segments = split_segments(title.trim());
    let name = strip_quotes(segments.first()?).trim();
    if name.is_empty() {
        return None;
    }
    Some(name.to_string())
}

/// Presence text under the header (`"online"`, `"last seen today at 09:15"`, `"typing…"`).
/// Placeholder prompts are not presence and yield `None`.
pub fn parse_last_seen(subtitle: &str) -> Option<String> {
    let subtitle = subtitle.trim();
    if subtitle.is_empty() {
        return None;
    }
    let normalized = normalize(subtitle);
    if HEADER_NOISE.iter().any(|noise| normalized == *noise) {
        return None;
    }
    Some(subtitle.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_title() {
        assert_eq!(parse_header_title("Alice").as_deref(), Some("Alice"));
        assert_eq!(parse_header_title("Team, online").as_deref(), Some("Team"));
        assert_eq!(parse_header_title("  "), None);
    }

    #[test]
    fn test_last_seen() {
        assert_eq!(
            parse_last_seen("last seen today at 09:15").as_deref(),
            Some("last seen today at 09:15")
        );
        assert_eq!(parse_last_seen("Click here for contact info"), None);
        assert_eq!(parse_last_seen(""), None);
    }
}
