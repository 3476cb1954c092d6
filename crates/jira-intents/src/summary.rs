use crate::IntentError;

/// A ticket summary with an optional trailing `@user` pulled off it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryWithAssignee {
    pub summary: String,
    /// Handle without the leading `@`.
    pub assignee: Option<String>,
}

/// Splits a trailing `@username` token off a free-text summary.
///
/// Only the last whitespace-delimited token is considered, and only when its
/// first character is `@`. A bare `@` is not treated as a handle.
pub fn split_assignee(summary: &str) -> Result<SummaryWithAssignee, IntentError> {
    let trimmed = summary.trim();
    if trimmed.is_empty() {
        return Err(IntentError::InvalidArgument(
            "summary must not be empty".to_owned(),
        ));
    }

    let (head, last) = match trimmed.rfind(char::is_whitespace) {
        Some(idx) => {
            let (head, tail) = trimmed.split_at(idx);
            (head.trim_end(), tail.trim_start())
        }
        None => ("", trimmed),
    };

    match last.strip_prefix('@') {
        Some(handle) if !handle.is_empty() => Ok(SummaryWithAssignee {
            summary: head.to_owned(),
            assignee: Some(handle.to_owned()),
        }),
        _ => Ok(SummaryWithAssignee {
            summary: summary.to_owned(),
            assignee: None,
        }),
    }
}
