use crate::IntentError;

/// One workflow action offered by the tracker for an issue in its current
/// state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub id: String,
    pub name: String,
}

impl Transition {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Picks the transition whose display name equals `requested`, ignoring case.
///
/// On a miss the error carries every available name so the user can retry.
pub fn resolve_transition<'a>(
    available: &'a [Transition],
    requested: &str,
) -> Result<&'a Transition, IntentError> {
    let wanted = requested.to_lowercase();
    available
        .iter()
        .find(|t| t.name.to_lowercase() == wanted)
        .ok_or_else(|| IntentError::UnknownTransition {
            requested: requested.to_owned(),
            available: available.iter().map(|t| t.name.clone()).collect(),
        })
}
