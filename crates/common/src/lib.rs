//! Value types shared by the ledger, executor, coordinator and API crates.

mod types;

pub use types::{IdempotencyKey, LedgerSnapshot, PurchasePath};
