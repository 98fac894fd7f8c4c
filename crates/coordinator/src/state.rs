//! Confirmation state machine.

use serde::{Deserialize, Serialize};

/// The state of one confirmation in its lifecycle.
///
/// State transitions:
/// ```text
/// Idle ──► Invoking ──┬──► Succeeded
///            ▲   │    ├──► Rejected
///            └───┘    ├──► Failed
///       (transient    └──► Cancelled
///        failure)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ConfirmationState {
    /// No attempt has been made yet.
    #[default]
    Idle,

    /// An invocation is in flight or the loop is backing off before the next one.
    Invoking,

    /// A snapshot was received (terminal state).
    Succeeded,

    /// The purchase was refused as out of stock (terminal state).
    Rejected,

    /// The retry ceiling, the deadline or an undecodable response ended the loop (terminal state).
    Failed,

    /// The caller cancelled (terminal state).
    Cancelled,
}

impl ConfirmationState {
    /// Returns true if another invocation may be started.
    pub fn can_invoke(&self) -> bool {
        matches!(self, ConfirmationState::Idle | ConfirmationState::Invoking)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        !self.can_invoke()
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationState::Idle => "Idle",
            ConfirmationState::Invoking => "Invoking",
            ConfirmationState::Succeeded => "Succeeded",
            ConfirmationState::Rejected => "Rejected",
            ConfirmationState::Failed => "Failed",
            ConfirmationState::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for ConfirmationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_idle() {
        assert_eq!(ConfirmationState::default(), ConfirmationState::Idle);
    }

    #[test]
    fn test_can_invoke() {
        assert!(ConfirmationState::Idle.can_invoke());
        assert!(ConfirmationState::Invoking.can_invoke());
        assert!(!ConfirmationState::Succeeded.can_invoke());
        assert!(!ConfirmationState::Rejected.can_invoke());
        assert!(!ConfirmationState::Failed.can_invoke());
        assert!(!ConfirmationState::Cancelled.can_invoke());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ConfirmationState::Idle.is_terminal());
        assert!(!ConfirmationState::Invoking.is_terminal());
        assert!(ConfirmationState::Succeeded.is_terminal());
        assert!(ConfirmationState::Rejected.is_terminal());
        assert!(ConfirmationState::Failed.is_terminal());
        assert!(ConfirmationState::Cancelled.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(ConfirmationState::Idle.to_string(), "Idle");
        assert_eq!(ConfirmationState::Succeeded.to_string(), "Succeeded");
        assert_eq!(ConfirmationState::Failed.to_string(), "Failed");
    }
}
