use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntentError {
    #[error("Issue id format incorrect: {0}")]
    InvalidIssueKeyFormat(String),

    /// The requested transition is not offered for the issue in its current
    /// state. `available` keeps the tracker's casing and order.
    #[error(
        "Unknown transition \"{requested}\". Available transitions:\n{}",
        .available.join("\n")
    )]
    UnknownTransition {
        requested: String,
        available: Vec<String>,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
