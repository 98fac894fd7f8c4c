//! Inventory/balance ledger for the purchase demo.
//!
//! Each purchase path owns its own ledger. The protected ledger additionally
//! records idempotency keys so a retried purchase is applied at most once.
//! The [`FaultFlag`] is the simulated crash switch stored alongside.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::{IdempotencyKey, LedgerSnapshot, PurchasePath};
pub use error::{LedgerError, Result};
pub use memory::{InMemoryFaultFlag, InMemoryLedgerStore};
pub use postgres::{PostgresFaultFlag, PostgresLedgerStore};
pub use store::{
    CommitOutcome, FaultFlag, LedgerSeed, LedgerStore, Purchase, apply_purchase,
    provision_if_missing,
};
