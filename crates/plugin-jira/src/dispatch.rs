use core::fmt::{self, Write as _};

use jira_intents::{
    IntentError, IssueKey, build_search_query, resolve_transition, scan_mentions,
};
use plugin_core::Card;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::command::{
    AssignArgs, Command, CreateArgs, GetArgs, JqlArgs, SearchArgs, TransitionArgs, USAGE_LINES,
};
use crate::tracker::{Issue, NewIssue, SEARCH_LIMIT, Tracker, TrackerError, User};

/// Failures of an explicit command. The `Display` text is what the user sees.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Unknown jira command: {0}. Try !jira help")]
    UnknownCommand(String),
    #[error(transparent)]
    Intent(#[from] IntentError),
    #[error("No corresponding user found: {0}")]
    UserNotFound(String),
    #[error("Too many users found: {}", .candidates.join(", "))]
    AmbiguousUser {
        query: String,
        candidates: Vec<String>,
    },
    #[error("{0} not found")]
    NotFound(String),
    #[error("Error communicating with Jira, could not reach the tracker")]
    Tracker(#[source] TrackerError),
    /// The issue exists but a follow-up step failed; retrying would
    /// duplicate it.
    #[error("Created {key} but could not {step} it, could not reach the tracker")]
    CreatedWithErrors {
        key: IssueKey,
        step: &'static str,
        source: TrackerError,
    },
}

impl From<TrackerError> for CommandError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::NotFound(what) => Self::NotFound(what),
            other @ (TrackerError::Http(_)
            | TrackerError::Status { .. }
            | TrackerError::UnexpectedResponse(_)
            | TrackerError::Login(_)) => Self::Tracker(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Card(Card),
}

/// Runs parsed commands against a tracker session.
#[derive(Clone, Copy)]
pub struct Dispatcher<'a> {
    tracker: &'a dyn Tracker,
    project: &'a str,
}

impl fmt::Debug for Dispatcher<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("project", &self.project)
            .finish_non_exhaustive()
    }
}

impl<'a> Dispatcher<'a> {
    #[must_use]
    pub fn new(tracker: &'a dyn Tracker, project: &'a str) -> Self {
        Self { tracker, project }
    }

    pub async fn execute(&self, command: Command) -> Result<Reply, CommandError> {
        match command {
            Command::Get(args) => self.get(&args).await,
            Command::Create(args) => self.create(args).await,
            Command::Assign(args) => self.assign(&args).await,
            Command::Transition(args) => self.transition(&args).await,
            Command::Search(args) => self.search(&args).await,
            Command::Jql(args) => self.jql(&args).await,
            Command::Help => Ok(Reply::Text(help_text())),
        }
    }

    async fn get(&self, args: &GetArgs) -> Result<Reply, CommandError> {
        let issue = self.tracker.fetch_issue(&args.key).await?;
        Ok(Reply::Card(self.issue_card(&issue)))
    }

    async fn create(&self, args: CreateArgs) -> Result<Reply, CommandError> {
        // Resolve the assignee first so a bad handle does not leave an
        // orphaned issue behind.
        let assignee = match &args.assignee {
            Some(handle) => Some(self.find_one_user(handle).await?),
            None => None,
        };

        let key = self
            .tracker
            .create_issue(&NewIssue {
                project: self.project.to_owned(),
                summary: args.summary,
                issue_type: args.issue_type,
                priority: args.priority,
            })
            .await?;
        info!(issue = %key, "Created Jira issue");

        if let Some(user) = assignee
            && let Err(source) = self.tracker.assign_issue(&key, &user.name).await
        {
            warn!(issue = %key, error = %source, "Assigning new issue failed");
            return Err(CommandError::CreatedWithErrors {
                key,
                step: "assign",
                source,
            });
        }

        match self.tracker.fetch_issue(&key).await {
            Ok(issue) => Ok(Reply::Card(self.issue_card(&issue))),
            Err(source) => {
                warn!(issue = %key, error = %source, "Fetching new issue failed");
                Err(CommandError::CreatedWithErrors {
                    key,
                    step: "display",
                    source,
                })
            }
        }
    }

    async fn assign(&self, args: &AssignArgs) -> Result<Reply, CommandError> {
        let user = self.find_one_user(&args.username).await?;
        self.tracker.assign_issue(&args.key, &user.name).await?;
        Ok(Reply::Text(format!(
            "Issue {} assigned to {}",
            args.key, user.display_name
        )))
    }

    async fn transition(&self, args: &TransitionArgs) -> Result<Reply, CommandError> {
        let available = self.tracker.list_transitions(&args.key).await?;
        let transition = resolve_transition(&available, &args.transition)?;
        self.tracker
            .apply_transition(&args.key, &transition.id)
            .await?;
        Ok(Reply::Text(format!(
            "Issue {} transitioned to {}",
            args.key, transition.name
        )))
    }

    async fn search(&self, args: &SearchArgs) -> Result<Reply, CommandError> {
        let query = build_search_query(&args.words, self.project, args.open_only);
        self.run_query(&query.to_jql()).await
    }

    async fn jql(&self, args: &JqlArgs) -> Result<Reply, CommandError> {
        self.run_query(&args.query).await
    }

    async fn run_query(&self, jql: &str) -> Result<Reply, CommandError> {
        let issues = self.tracker.run_query(jql, SEARCH_LIMIT).await?;
        if issues.is_empty() {
            return Ok(Reply::Text("No issues found.".to_owned()));
        }
        let mut out = String::new();
        for issue in &issues {
            let _ = writeln!(
                out,
                "{} [{}] {} {}",
                issue.key,
                issue.status,
                issue.summary,
                self.tracker.permalink(&issue.key)
            );
        }
        Ok(Reply::Text(out.trim_end().to_owned()))
    }

    async fn find_one_user(&self, query: &str) -> Result<User, CommandError> {
        let mut users = self
            .tracker
            .find_assignable_users(query, self.project)
            .await?;
        match users.len() {
            0 => Err(CommandError::UserNotFound(query.to_owned())),
            1 => Ok(users.remove(0)),
            _ => Err(CommandError::AmbiguousUser {
                query: query.to_owned(),
                candidates: users.into_iter().map(|u| u.name).collect(),
            }),
        }
    }

    /// Looks up issue keys mentioned in passing and renders the first one that
    /// resolves. Lookup failures are logged and otherwise ignored.
    pub async fn lookup_mentions(&self, text: &str) -> Option<Card> {
        for key in scan_mentions(text) {
            match self.tracker.fetch_issue(&key).await {
                Ok(issue) => return Some(self.issue_card(&issue)),
                Err(e) => debug!(issue = %key, error = %e, "Passive issue lookup failed"),
            }
        }
        None
    }

    fn issue_card(&self, issue: &Issue) -> Card {
        Card {
            title: issue.summary.clone(),
            summary: Some(format!("Jira issue {}:", issue.key)),
            link: Some(self.tracker.permalink(&issue.key)),
            body: Some(issue.status.clone()),
            fields: vec![
                (
                    "Assignee".to_owned(),
                    issue
                        .assignee
                        .clone()
                        .unwrap_or_else(|| "Unassigned".to_owned()),
                ),
                (
                    "Priority".to_owned(),
                    issue.priority.clone().unwrap_or_else(|| "None".to_owned()),
                ),
            ],
            color: Some("red".to_owned()),
        }
    }
}

fn help_text() -> String {
    let mut out = "Jira commands:".to_owned();
    for line in USAGE_LINES {
        let _ = write!(out, "\n  {line}");
    }
    out
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use async_trait::async_trait;
    use jira_intents::{IssueKey, Transition, parse_issue_key};

    use super::*;
    use crate::command::parse_command;

    #[derive(Default)]
    struct FakeTracker {
        issues: Mutex<HashMap<String, Issue>>,
        transitions: Vec<Transition>,
        users: Vec<User>,
        offline: bool,
        reject_assign: bool,
        calls: Mutex<Vec<String>>,
    }

    fn open_issue(key: &str, summary: &str) -> Issue {
        Issue {
            key: key.to_owned(),
            summary: summary.to_owned(),
            status: "Open".to_owned(),
            assignee: None,
            priority: Some("Major".to_owned()),
            issue_type: Some("Bug".to_owned()),
        }
    }

    impl FakeTracker {
        fn with_issue(self, key: &str, summary: &str) -> Self {
            self.issues
                .lock()
                .unwrap()
                .insert(key.to_owned(), open_issue(key, summary));
            self
        }

        fn with_users(mut self, names: &[&str]) -> Self {
            self.users = names
                .iter()
                .map(|n| User {
                    name: (*n).to_owned(),
                    display_name: n.to_uppercase(),
                })
                .collect();
            self
        }

        fn record(&self, call: String) -> Result<(), TrackerError> {
            self.calls.lock().unwrap().push(call);
            if self.offline {
                return Err(TrackerError::Status {
                    status: 503,
                    body: "down".to_owned(),
                });
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Tracker for FakeTracker {
        async fn fetch_issue(&self, key: &IssueKey) -> Result<Issue, TrackerError> {
            self.record(format!("fetch {key}"))?;
            self.issues
                .lock()
                .unwrap()
                .get(&key.to_string())
                .cloned()
                .ok_or_else(|| TrackerError::NotFound(format!("Issue {key}")))
        }

        async fn list_transitions(
            &self,
            key: &IssueKey,
        ) -> Result<Vec<Transition>, TrackerError> {
            self.record(format!("transitions {key}"))?;
            Ok(self.transitions.clone())
        }

        async fn apply_transition(
            &self,
            key: &IssueKey,
            transition_id: &str,
        ) -> Result<(), TrackerError> {
            self.record(format!("apply {key} {transition_id}"))
        }

        async fn create_issue(&self, issue: &NewIssue) -> Result<IssueKey, TrackerError> {
            self.record(format!(
                "create {} {} {} {:?}",
                issue.project, issue.issue_type, issue.summary, issue.priority
            ))?;
            let key = format!("{}-100", issue.project);
            self.issues
                .lock()
                .unwrap()
                .insert(key.clone(), open_issue(&key, &issue.summary));
            Ok(parse_issue_key(&key).unwrap())
        }

        async fn assign_issue(&self, key: &IssueKey, username: &str) -> Result<(), TrackerError> {
            self.record(format!("assign {key} {username}"))?;
            if self.reject_assign {
                return Err(TrackerError::Status {
                    status: 400,
                    body: "user cannot be assigned".to_owned(),
                });
            }
            Ok(())
        }

        async fn find_assignable_users(
            &self,
            query: &str,
            project: &str,
        ) -> Result<Vec<User>, TrackerError> {
            self.record(format!("users {query} {project}"))?;
            Ok(self
                .users
                .iter()
                .filter(|u| u.name.starts_with(query))
                .cloned()
                .collect())
        }

        async fn run_query(&self, jql: &str, limit: u32) -> Result<Vec<Issue>, TrackerError> {
            self.record(format!("query {limit} {jql}"))?;
            let mut issues: Vec<Issue> = self.issues.lock().unwrap().values().cloned().collect();
            issues.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(issues)
        }

        fn permalink(&self, key: &str) -> String {
            format!("https://jira.example.com/browse/{key}")
        }
    }

    async fn run(tracker: &FakeTracker, args: &str) -> Result<Reply, CommandError> {
        let command = parse_command(args)?;
        Dispatcher::new(tracker, "FOO").execute(command).await
    }

    #[tokio::test]
    async fn get_renders_issue_card() {
        let tracker = FakeTracker::default().with_issue("FOO-1", "Login fails");
        let Reply::Card(card) = run(&tracker, "foo1").await.unwrap() else {
            panic!("expected a card");
        };
        assert_eq!(card.title, "Login fails");
        assert_eq!(card.summary.as_deref(), Some("Jira issue FOO-1:"));
        assert_eq!(
            card.link.as_deref(),
            Some("https://jira.example.com/browse/FOO-1")
        );
        assert_eq!(card.body.as_deref(), Some("Open"));
        assert_eq!(
            card.fields,
            vec![
                ("Assignee".to_owned(), "Unassigned".to_owned()),
                ("Priority".to_owned(), "Major".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn missing_issue_is_reported() {
        let tracker = FakeTracker::default();
        let err = run(&tracker, "get foo-9").await.unwrap_err();
        assert_eq!(err.to_string(), "Issue FOO-9 not found");
    }

    #[tokio::test]
    async fn invalid_key_never_reaches_tracker() {
        let tracker = FakeTracker::default();
        let err = run(&tracker, "get nope").await.unwrap_err();
        assert_eq!(err.to_string(), "Issue id format incorrect: nope");
        assert!(tracker.calls().is_empty());
    }

    #[tokio::test]
    async fn tracker_outage_is_generic() {
        let tracker = FakeTracker {
            offline: true,
            ..FakeTracker::default()
        };
        let err = run(&tracker, "get foo-1").await.unwrap_err();
        assert!(matches!(err, CommandError::Tracker(_)));
        assert_eq!(
            err.to_string(),
            "Error communicating with Jira, could not reach the tracker"
        );
    }

    #[tokio::test]
    async fn create_assigns_then_displays() {
        let tracker = FakeTracker::default().with_users(&["ada"]);
        let reply = run(&tracker, "create -t Bug -p High login fails @ada")
            .await
            .unwrap();
        let Reply::Card(card) = reply else {
            panic!("expected a card");
        };
        assert_eq!(card.summary.as_deref(), Some("Jira issue FOO-100:"));
        assert_eq!(card.title, "login fails");
        assert_eq!(
            tracker.calls(),
            vec![
                "users ada FOO".to_owned(),
                "create FOO Bug login fails Some(\"High\")".to_owned(),
                "assign FOO-100 ada".to_owned(),
                "fetch FOO-100".to_owned(),
            ]
        );
    }

    #[tokio::test]
    async fn create_reports_key_when_assign_fails() {
        let tracker = FakeTracker {
            reject_assign: true,
            ..FakeTracker::default().with_users(&["ada"])
        };
        let err = run(&tracker, "create login fails @ada").await.unwrap_err();
        assert!(matches!(
            &err,
            CommandError::CreatedWithErrors { key, step: "assign", .. } if key.to_string() == "FOO-100"
        ));
        assert_eq!(
            err.to_string(),
            "Created FOO-100 but could not assign it, could not reach the tracker"
        );
        assert!(!tracker.calls().contains(&"fetch FOO-100".to_owned()));
    }

    #[tokio::test]
    async fn create_with_unknown_user_creates_nothing() {
        let tracker = FakeTracker::default();
        let err = run(&tracker, "create broken build @ghost").await.unwrap_err();
        assert_eq!(err.to_string(), "No corresponding user found: ghost");
        assert_eq!(tracker.calls(), vec!["users ghost FOO".to_owned()]);
    }

    #[tokio::test]
    async fn assign_reports_display_name() {
        let tracker = FakeTracker::default().with_users(&["ada", "bob"]);
        let reply = run(&tracker, "assign foo-1 ada").await.unwrap();
        assert_eq!(reply, Reply::Text("Issue FOO-1 assigned to ADA".to_owned()));
        assert!(tracker.calls().contains(&"assign FOO-1 ada".to_owned()));
    }

    #[tokio::test]
    async fn ambiguous_user_lists_candidates() {
        let tracker = FakeTracker::default().with_users(&["ada", "adam"]);
        let err = run(&tracker, "assign foo-1 ada").await.unwrap_err();
        assert_eq!(err.to_string(), "Too many users found: ada, adam");
        assert!(!tracker.calls().iter().any(|c| c.starts_with("assign")));
    }

    #[tokio::test]
    async fn transition_resolves_name_case_insensitively() {
        let tracker = FakeTracker {
            transitions: vec![
                Transition::new("11", "Open"),
                Transition::new("21", "In Progress"),
            ],
            ..FakeTracker::default()
        };
        let reply = run(&tracker, "transition foo-1 in progress").await.unwrap();
        assert_eq!(
            reply,
            Reply::Text("Issue FOO-1 transitioned to In Progress".to_owned())
        );
        assert_eq!(
            tracker.calls(),
            vec!["transitions FOO-1".to_owned(), "apply FOO-1 21".to_owned()]
        );
    }

    #[tokio::test]
    async fn unknown_transition_lists_options() {
        let tracker = FakeTracker {
            transitions: vec![
                Transition::new("11", "Open"),
                Transition::new("21", "In Progress"),
            ],
            ..FakeTracker::default()
        };
        let err = run(&tracker, "transition foo-1 Closed").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unknown transition \"Closed\". Available transitions:\nOpen\nIn Progress"
        );
    }

    #[tokio::test]
    async fn search_builds_scoped_query() {
        let tracker = FakeTracker::default().with_issue("FOO-1", "auth bug");
        let reply = run(&tracker, "search --open auth bug").await.unwrap();
        assert_eq!(
            reply,
            Reply::Text(
                "FOO-1 [Open] auth bug https://jira.example.com/browse/FOO-1".to_owned()
            )
        );
        assert_eq!(
            tracker.calls(),
            vec![
                "query 50 project=FOO and (summary ~ \"auth bug\" or description ~ \"auth bug\") and status=Open order by created desc"
                    .to_owned()
            ]
        );
    }

    #[tokio::test]
    async fn jql_passes_raw_query() {
        let tracker = FakeTracker::default();
        let reply = run(&tracker, "jql status = Done").await.unwrap();
        assert_eq!(reply, Reply::Text("No issues found.".to_owned()));
        assert_eq!(tracker.calls(), vec!["query 50 status = Done".to_owned()]);
    }

    #[tokio::test]
    async fn help_lists_every_command() {
        let Reply::Text(text) = run(&FakeTracker::default(), "help").await.unwrap() else {
            panic!("expected text");
        };
        for line in USAGE_LINES {
            assert!(text.contains(line));
        }
    }

    #[tokio::test]
    async fn passive_lookup_skips_failures() {
        let tracker = FakeTracker::default().with_issue("BAR-9", "Crash on save");
        let card = Dispatcher::new(&tracker, "FOO")
            .lookup_mentions("is FOO-1 related to bar-9?")
            .await
            .unwrap();
        assert_eq!(card.title, "Crash on save");
        assert_eq!(
            tracker.calls(),
            vec!["fetch FOO-1".to_owned(), "fetch BAR-9".to_owned()]
        );
    }

    #[tokio::test]
    async fn passive_lookup_is_silent_when_offline() {
        let tracker = FakeTracker {
            offline: true,
            ..FakeTracker::default()
        };
        let card = Dispatcher::new(&tracker, "FOO")
            .lookup_mentions("see FOO-1")
            .await;
        assert!(card.is_none());
    }

    #[tokio::test]
    async fn passive_lookup_ignores_plain_chat() {
        let tracker = FakeTracker::default();
        assert!(
            Dispatcher::new(&tracker, "FOO")
                .lookup_mentions("nothing to see here")
                .await
                .is_none()
        );
        assert!(tracker.calls().is_empty());
    }
}
