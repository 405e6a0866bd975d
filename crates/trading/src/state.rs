//! Purchase saga states.

use serde::{Deserialize, Serialize};

/// The state of a purchase saga in its lifecycle.
///
/// State transitions:
/// ```text
/// Initial ──┬──► Accepted ──┬──► ItemsGranted ──┬──► Completed
///           │               │                   │
///           └───────────────┴───────────────────┴──► Faulted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// No record exists yet for the correlation id.
    #[default]
    Initial,

    /// Total calculated, waiting for the inventory service to grant items.
    Accepted,

    /// Items granted, waiting for the identity service to debit gil.
    ItemsGranted,

    /// Items granted and gil debited (terminal state).
    Completed,

    /// The purchase could not complete (terminal state).
    Faulted,
}

impl SagaState {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Faulted)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Initial => "Initial",
            SagaState::Accepted => "Accepted",
            SagaState::ItemsGranted => "ItemsGranted",
            SagaState::Completed => "Completed",
            SagaState::Faulted => "Faulted",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
