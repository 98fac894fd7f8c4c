use thiserror::Error;

/// Errors that can occur when reading or committing to the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The warehouse has no units left. This is the only business-rule failure.
    #[error("Insufficient inventory")]
    InsufficientInventory,

    /// The store could not be reached or refused the operation.
    #[error("Ledger store unavailable: {0}")]
    Unavailable(String),

    /// Charging the purchase would take the balance past `i64::MIN`.
    #[error("Balance overflow: charging {charge} against {balance}")]
    BalanceOverflow { balance: i64, charge: i64 },

    /// A stored row is missing or holds an unexpected value.
    #[error("Ledger state corrupt: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl LedgerError {
    /// Returns true for the out-of-stock rejection.
    pub fn is_insufficient_inventory(&self) -> bool {
        matches!(self, LedgerError::InsufficientInventory)
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
