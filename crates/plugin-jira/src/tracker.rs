use async_trait::async_trait;
use jira_intents::{IssueKey, Transition};
use thiserror::Error;

/// Cap applied to every search the bot runs.
pub const SEARCH_LIMIT: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub key: String,
    pub summary: String,
    pub status: String,
    pub assignee: Option<String>,
    pub priority: Option<String>,
    pub issue_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Identifier the tracker expects when assigning.
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssue {
    pub project: String,
    pub summary: String,
    pub issue_type: String,
    pub priority: Option<String>,
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("tracker request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("tracker returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected tracker response: {0}")]
    UnexpectedResponse(String),
    #[error("tracker login failed: {0}")]
    Login(String),
}

/// The issue tracker as seen by the chat commands.
#[async_trait]
pub trait Tracker: Send + Sync {
    async fn fetch_issue(&self, key: &IssueKey) -> Result<Issue, TrackerError>;

    /// Transitions valid for the issue in its current workflow state.
    async fn list_transitions(&self, key: &IssueKey) -> Result<Vec<Transition>, TrackerError>;

    async fn apply_transition(&self, key: &IssueKey, transition_id: &str)
    -> Result<(), TrackerError>;

    async fn create_issue(&self, issue: &NewIssue) -> Result<IssueKey, TrackerError>;

    async fn assign_issue(&self, key: &IssueKey, username: &str) -> Result<(), TrackerError>;

    async fn find_assignable_users(
        &self,
        query: &str,
        project: &str,
    ) -> Result<Vec<User>, TrackerError>;

    async fn run_query(&self, jql: &str, limit: u32) -> Result<Vec<Issue>, TrackerError>;

    fn permalink(&self, key: &str) -> String;
}
