//! Turns loose chat text into structured issue-tracker operations.
//!
//! Everything in this crate is pure: no I/O, no shared state, no async. The
//! chat plugin calls into it before and after talking to the tracker.

mod error;
mod issue_key;
mod mention;
mod query;
mod summary;
mod transition;

pub use error::IntentError;
pub use issue_key::{IssueKey, normalize_issue_key, parse_issue_key};
pub use mention::scan_mentions;
pub use query::{SearchQuery, build_search_query};
pub use summary::{SummaryWithAssignee, split_assignee};
pub use transition::{Transition, resolve_transition};
