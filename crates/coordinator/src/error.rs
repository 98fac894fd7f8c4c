//! Confirmation error types.

use thiserror::Error;

use crate::state::ConfirmationState;

/// Terminal failures of a confirmation.
#[derive(Debug, Error)]
pub enum ConfirmError {
    /// Nothing left to sell. Never retried.
    #[error("Insufficient inventory")]
    InsufficientInventory,

    /// The retry ceiling or the deadline was reached without a success.
    #[error("Confirmation timed out after {attempts} attempt(s)")]
    ConfirmationTimedOut { attempts: u32 },

    /// The response could not be decoded into a ledger snapshot.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The purchase function kept failing to reach its ledger.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The caller cancelled the confirmation. Work already committed stays.
    #[error("Confirmation cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
}

impl ConfirmError {
    /// Short label used in metrics and notices.
    pub fn outcome(&self) -> &'static str {
        match self {
            ConfirmError::InsufficientInventory => "rejected",
            ConfirmError::ConfirmationTimedOut { .. } => "timed_out",
            ConfirmError::ProtocolError(_) => "protocol_error",
            ConfirmError::StorageUnavailable(_) => "storage_unavailable",
            ConfirmError::Cancelled { .. } => "cancelled",
        }
    }

    /// The terminal state a confirmation ends in with this error.
    pub fn state(&self) -> ConfirmationState {
        match self {
            ConfirmError::InsufficientInventory => ConfirmationState::Rejected,
            ConfirmError::Cancelled { .. } => ConfirmationState::Cancelled,
            ConfirmError::ConfirmationTimedOut { .. }
            | ConfirmError::ProtocolError(_)
            | ConfirmError::StorageUnavailable(_) => ConfirmationState::Failed,
        }
    }
}

impl From<serde_json::Error> for ConfirmError {
    fn from(err: serde_json::Error) -> Self {
        ConfirmError::ProtocolError(err.to_string())
    }
}

/// Convenience type alias for confirmation results.
pub type Result<T> = std::result::Result<T, ConfirmError>;
