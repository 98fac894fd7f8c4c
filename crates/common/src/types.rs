use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller-chosen identifier for one logical purchase.
///
/// Reused across every retry of the same confirmation so the protected
/// ledger can recognise a purchase it has already applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Creates a new random key.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an existing key value.
    pub fn from_string(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for IdempotencyKey {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for IdempotencyKey {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}

impl From<&str> for IdempotencyKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Inventory and balance as observed after a read or a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub inventory: i64,
    pub balance: i64,
}

impl LedgerSnapshot {
    pub fn new(inventory: i64, balance: i64) -> Self {
        Self { inventory, balance }
    }
}

impl std::fmt::Display for LedgerSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "inventory={} balance={}", self.inventory, self.balance)
    }
}

/// Which purchase flow a request goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchasePath {
    /// Guarded by an idempotency key; applied at most once.
    Protected,
    /// No duplicate suppression; retries may apply twice.
    Unprotected,
}

impl PurchasePath {
    pub fn from_protection(use_protection: bool) -> Self {
        if use_protection {
            PurchasePath::Protected
        } else {
            PurchasePath::Unprotected
        }
    }

    pub fn is_protected(&self) -> bool {
        matches!(self, PurchasePath::Protected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PurchasePath::Protected => "protected",
            PurchasePath::Unprotected => "unprotected",
        }
    }
}

impl std::fmt::Display for PurchasePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
