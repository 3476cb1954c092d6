use jira_intents::{IntentError, IssueKey, parse_issue_key, split_assignee};

use crate::dispatch::CommandError;

pub const GET_USAGE: &str = "!jira get <issue_id>";
pub const CREATE_USAGE: &str = "!jira create [-t type] [-p priority] <summary> [@user]";
pub const ASSIGN_USAGE: &str = "!jira assign <issue_id> <username>";
pub const TRANSITION_USAGE: &str = "!jira transition <issue_id> <transition_name>";
pub const SEARCH_USAGE: &str = "!jira search [--open] <text>";
pub const JQL_USAGE: &str = "!jira jql <query>";

pub const USAGE_LINES: [&str; 6] = [
    GET_USAGE,
    CREATE_USAGE,
    ASSIGN_USAGE,
    TRANSITION_USAGE,
    SEARCH_USAGE,
    JQL_USAGE,
];

const DEFAULT_ISSUE_TYPE: &str = "Task";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetArgs {
    pub key: IssueKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateArgs {
    pub issue_type: String,
    pub priority: Option<String>,
    pub summary: String,
    pub assignee: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignArgs {
    pub key: IssueKey,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionArgs {
    pub key: IssueKey,
    pub transition: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchArgs {
    pub words: Vec<String>,
    pub open_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JqlArgs {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get(GetArgs),
    Create(CreateArgs),
    Assign(AssignArgs),
    Transition(TransitionArgs),
    Search(SearchArgs),
    Jql(JqlArgs),
    Help,
}

/// Parses everything after `!jira` into a validated command.
///
/// A lone issue id (`!jira foo-12`) is shorthand for `get`.
pub fn parse_command(args: &str) -> Result<Command, CommandError> {
    let trimmed = args.trim();
    let (sub, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((sub, rest)) => (sub, rest.trim()),
        None => (trimmed, ""),
    };
    let words: Vec<&str> = rest.split_whitespace().collect();

    match sub.to_lowercase().as_str() {
        "" | "help" => Ok(Command::Help),
        "get" => match words.as_slice() {
            [id] => Ok(Command::Get(GetArgs {
                key: parse_issue_key(id)?,
            })),
            _ => Err(CommandError::Usage(GET_USAGE)),
        },
        "create" => parse_create(&words),
        "assign" => match words.as_slice() {
            [id, username] => Ok(Command::Assign(AssignArgs {
                key: parse_issue_key(id)?,
                username: (*username).to_owned(),
            })),
            _ => Err(CommandError::Usage(ASSIGN_USAGE)),
        },
        "transition" => match words.as_slice() {
            [id, name @ ..] if !name.is_empty() => Ok(Command::Transition(TransitionArgs {
                key: parse_issue_key(id)?,
                transition: name.join(" "),
            })),
            _ => Err(CommandError::Usage(TRANSITION_USAGE)),
        },
        "search" => {
            let (open_only, words) = match words.split_first() {
                Some((&"--open", tail)) => (true, tail),
                _ => (false, words.as_slice()),
            };
            if words.is_empty() {
                return Err(CommandError::Usage(SEARCH_USAGE));
            }
            Ok(Command::Search(SearchArgs {
                words: words.iter().map(|w| (*w).to_owned()).collect(),
                open_only,
            }))
        }
        "jql" => {
            if rest.is_empty() {
                return Err(CommandError::Usage(JQL_USAGE));
            }
            Ok(Command::Jql(JqlArgs {
                query: rest.to_owned(),
            }))
        }
        _ if rest.is_empty() => Ok(Command::Get(GetArgs {
            key: parse_issue_key(sub)?,
        })),
        _ => Err(CommandError::UnknownCommand(sub.to_owned())),
    }
}

fn parse_create(words: &[&str]) -> Result<Command, CommandError> {
    let mut issue_type = DEFAULT_ISSUE_TYPE.to_owned();
    let mut priority = None;
    let mut remaining = words;
    loop {
        match remaining {
            [flag, value, tail @ ..] if matches!(*flag, "-t" | "--type") => {
                issue_type = (*value).to_owned();
                remaining = tail;
            }
            [flag, value, tail @ ..] if matches!(*flag, "-p" | "--priority") => {
                priority = Some((*value).to_owned());
                remaining = tail;
            }
            [flag] if matches!(*flag, "-t" | "--type" | "-p" | "--priority") => {
                return Err(CommandError::Usage(CREATE_USAGE));
            }
            _ => break,
        }
    }
    if remaining.is_empty() {
        return Err(CommandError::Usage(CREATE_USAGE));
    }

    let split = split_assignee(&remaining.join(" "))?;
    if split.summary.trim().is_empty() {
        return Err(IntentError::InvalidArgument("summary must not be empty".to_owned()).into());
    }
    Ok(Command::Create(CreateArgs {
        issue_type,
        priority,
        summary: split.summary,
        assignee: split.assignee,
    }))
}
