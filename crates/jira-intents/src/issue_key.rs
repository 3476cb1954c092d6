use core::{fmt, str::FromStr};
use std::{collections::HashSet, sync::OnceLock};

use regex::Regex;

use crate::IntentError;

static HYPHENATED_REGEX: OnceLock<Regex> = OnceLock::new();
static COMPACT_REGEX: OnceLock<Regex> = OnceLock::new();

// Letters exclude digits and underscore but accept any unicode letter.
fn hyphenated_regex() -> &'static Regex {
    HYPHENATED_REGEX.get_or_init(|| Regex::new(r"([^\W\d_]+)-([0-9]+)").expect("valid regex"))
}

fn compact_regex() -> &'static Regex {
    COMPACT_REGEX.get_or_init(|| Regex::new(r"([^\W\d_]+)([0-9]+)").expect("valid regex"))
}

/// A canonical `PROJECT-NUMBER` issue key.
///
/// The project code is stored upper-cased, so derived equality is
/// case-insensitive on the project. The number keeps the literal digits it
/// was written with (`foo-007` stays `FOO-007`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IssueKey {
    project: String,
    number: String,
}

impl IssueKey {
    /// Builds a key from its two parts, rejecting anything that is not a
    /// letters-only project code and an ASCII-digit number.
    #[must_use]
    pub fn new(project: &str, number: &str) -> Option<Self> {
        let valid_project = !project.is_empty() && project.chars().all(char::is_alphabetic);
        let valid_number = !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit());
        (valid_project && valid_number).then(|| Self::from_parts(project, number))
    }

    pub(crate) fn from_parts(project: &str, number: &str) -> Self {
        Self {
            project: project.to_uppercase(),
            number: number.to_owned(),
        }
    }

    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    #[must_use]
    pub fn number(&self) -> &str {
        &self.number
    }
}

impl fmt::Display for IssueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.project, self.number)
    }
}

impl FromStr for IssueKey {
    type Err = IntentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_issue_key(s)
    }
}

/// Finds an issue key anywhere in `input`, accepting both `foo-123` and
/// `foo123`.
///
/// Every match of both shapes is collected into a set and one element is
/// returned. When the input holds several distinct keys, which one wins is
/// unspecified and may differ between runs; callers must not rely on it.
#[must_use]
pub fn normalize_issue_key(input: &str) -> Option<IssueKey> {
    let mut matches: HashSet<(&str, &str)> = HashSet::new();
    for regex in [hyphenated_regex(), compact_regex()] {
        for caps in regex.captures_iter(input) {
            if let (Some(project), Some(number)) = (caps.get(1), caps.get(2)) {
                matches.insert((project.as_str(), number.as_str()));
            }
        }
    }
    matches
        .into_iter()
        .next()
        .map(|(project, number)| IssueKey::from_parts(project, number))
}

/// Like [`normalize_issue_key`], but reports a typed error naming the input.
pub fn parse_issue_key(input: &str) -> Result<IssueKey, IntentError> {
    normalize_issue_key(input)
        .ok_or_else(|| IntentError::InvalidIssueKeyFormat(input.trim().to_owned()))
}
