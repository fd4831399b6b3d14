/// Normalize a string by removing zero-width and special Unicode whitespace characters and lowercasing it.
pub fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| {
            // Remove zero-width and directional marks, keep regular spaces
            !matches!(
                *c,
                '\u{200B}' | // zero-width space
                '\u{200C}' | // zero-width non-joiner
                '\u{200D}' | // zero-width joiner
                '\u{200E}' | // left-to-right mark
                '\u{200F}' | // right-to-left mark
                '\u{202A}'..='\u{202E}' | // bidi embedding controls
                '\u{FEFF}' // zero-width no-break space
            )
        })
        .map(|c| if c == '\u{00A0}' || c == '\u{202F}' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_lowercase()
}

/// How well a displayed name matches a requested one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NameMatch {
    Partial,
    Exact,
}

/// Compare a displayed chat name against a query, ignoring case and invisible characters.
pub fn match_name(displayed: &str, query: &str) -> Option<NameMatch> {
    let displayed = normalize(displayed);
    let query = normalize(query);
    if query.is_empty() {
        return None;
    }
    if displayed == query {
        Some(NameMatch::Exact)
    } else if displayed.contains(&query) {
        Some(NameMatch::Partial)
    } else {
        None
    }
}

/// Pick the best match from `candidates`: the first exact match, otherwise the first partial one.
pub fn best_match<'a, T>(
    candidates: impl IntoIterator<Item = &'a T>,
    name_of: impl Fn(&T) -> &str,
    query: &str,
) -> Option<&'a T> {
    let mut partial = None;
    for candidate in candidates {
        match match_name(name_of(candidate), query) {
            Some(NameMatch::Exact) => return Some(candidate),
            Some(NameMatch::Partial) if partial.is_none() => partial = Some(candidate),
            _ => {}
        }
    }
    partial
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_invisible_characters() {
        assert_eq!(normalize("\u{200E}Team\u{00A0}Chat "), "team chat");
        assert_eq!(normalize("\u{202A}Alice\u{202C}"), "alice");
    }

    #[test]
    fn test_match_name() {
        assert_eq!(match_name("Team", "team"), Some(NameMatch::Exact));
        assert_eq!(match_name("Family Team", "team"), Some(NameMatch::Partial));
        assert_eq!(match_name("Alice", "bob"), None);
        assert_eq!(match_name("Alice", "  "), None);
    }

    #[test]
    fn test_best_match_prefers_exact() {
        let names = vec!["Team Alpha".to_string(), "Team".to_string()];
        let found = best_match(&names, |s| s.as_str(), "team");
        assert_eq!(found.map(String::as_str), Some("Team"));

        let found = best_match(&names, |s| s.as_str(), "alpha");
        assert_eq!(found.map(String::as_str), Some("Team Alpha"));
    }
}
