//! Invocation error types.

use thiserror::Error;

/// Ways a single invocation of the purchase function can fail.
///
/// From the caller's side a crash before commit and a crash after commit
/// look the same: both are [`InvokeError::Transport`].
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The invocation did not complete: crash, timeout, lost connection.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The function ran and refused the purchase because nothing is left.
    #[error("Insufficient inventory")]
    InsufficientInventory,

    /// The function could not reach the ledger; nothing was acknowledged.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl InvokeError {
    /// Returns true if the same request may be sent again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            InvokeError::Transport(_) | InvokeError::StorageUnavailable(_)
        )
    }
}

impl From<ledger::LedgerError> for InvokeError {
    fn from(err: ledger::LedgerError) -> Self {
        if err.is_insufficient_inventory() {
            InvokeError::InsufficientInventory
        } else {
            InvokeError::StorageUnavailable(err.to_string())
        }
    }
}

/// Convenience type alias for invocation results.
pub type Result<T> = std::result::Result<T, InvokeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::LedgerError;

    #[test]
    fn test_ledger_rejection_maps_to_business_failure() {
        let err: InvokeError = LedgerError::InsufficientInventory.into();
        assert!(matches!(err, InvokeError::InsufficientInventory));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_ledger_outage_maps_to_storage_unavailable() {
        let err: InvokeError = LedgerError::Unavailable("down".to_string()).into();
        assert!(matches!(err, InvokeError::StorageUnavailable(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_transport_is_transient() {
        assert!(InvokeError::Transport("timeout".to_string()).is_transient());
    }
}
