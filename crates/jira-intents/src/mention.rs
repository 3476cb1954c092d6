use std::sync::OnceLock;

use regex::Regex;

use crate::IssueKey;

static MENTION_REGEX: OnceLock<Regex> = OnceLock::new();

fn mention_regex() -> &'static Regex {
    MENTION_REGEX.get_or_init(|| Regex::new(r"([^\W\d_]+)-([0-9]+)").expect("valid regex"))
}

/// Scans free chat text for issue keys mentioned in passing.
///
/// A mention must stand as its own word: preceded by whitespace or the start
/// of the text, followed by whitespace, the end of the text, or one of
/// `?`, `!`, `.`. Keys come back in the order they appear, duplicates
/// included.
#[must_use]
pub fn scan_mentions(text: &str) -> Vec<IssueKey> {
    mention_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            if !(opens_word(text, whole.start()) && closes_word(text, whole.end())) {
                return None;
            }
            Some(IssueKey::from_parts(caps.get(1)?.as_str(), caps.get(2)?.as_str()))
        })
        .collect()
}

fn opens_word(text: &str, start: usize) -> bool {
    text[..start].chars().next_back().is_none_or(char::is_whitespace)
}

fn closes_word(text: &str, end: usize) -> bool {
    text[end..]
        .chars()
        .next()
        .is_none_or(|c| c.is_whitespace() || matches!(c, '?' | '!' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(text: &str) -> Vec<String> {
        scan_mentions(text).iter().map(ToString::to_string).collect()
    }

    #[test]
    fn finds_mentions_in_order() {
        assert_eq!(keys("please check FOO-123 and BAR-9!"), ["FOO-123", "BAR-9"]);
    }

    #[test]
    fn accepts_trailing_punctuation_and_line_edges() {
        assert_eq!(keys("see foo-123?"), ["FOO-123"]);
        assert_eq!(keys("FOO-123 is broken"), ["FOO-123"]);
        assert_eq!(keys("fixed in foo-4."), ["FOO-4"]);
    }

    #[test]
    fn rejects_keys_glued_to_other_characters() {
        assert!(keys("XFOO-123Y").is_empty());
        assert!(keys("(FOO-1)").is_empty());
        assert!(keys("FOO-1,").is_empty());
        assert!(keys("path/foo-2 here").is_empty());
    }

    #[test]
    fn adjacent_mentions_are_both_found() {
        assert_eq!(keys("FOO-1 BAR-2"), ["FOO-1", "BAR-2"]);
    }

    #[test]
    fn duplicates_are_kept() {
        assert_eq!(keys("foo-1 then FOO-1 again"), ["FOO-1", "FOO-1"]);
    }

    #[test]
    fn compact_form_is_not_a_mention() {
        assert!(keys("build foo123 passed").is_empty());
        assert!(keys("").is_empty());
    }
}
