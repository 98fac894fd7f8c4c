use std::sync::Arc;

use async_trait::async_trait;
use common::{IdempotencyKey, LedgerSnapshot, PurchasePath};

use crate::{LedgerError, Result};

/// Starting values written when the ledgers are provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSeed {
    pub inventory: i64,
    pub balance: i64,
}

impl LedgerSeed {
    pub const DEFAULT_INVENTORY: i64 = 100;
    pub const DEFAULT_BALANCE: i64 = 1000;

    pub fn new(inventory: i64, balance: i64) -> Self {
        Self { inventory, balance }
    }
}

impl Default for LedgerSeed {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INVENTORY, Self::DEFAULT_BALANCE)
    }
}

/// One purchase: a single unit leaves the warehouse and `charge` leaves the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Purchase {
    pub charge: i64,
}

impl Purchase {
    pub fn new(charge: i64) -> Self {
        Self { charge }
    }
}

/// What a successful commit did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The mutation was applied; holds the snapshot after it.
    Applied(LedgerSnapshot),
    /// The key was already recorded; nothing changed. Holds the current snapshot.
    Replayed(LedgerSnapshot),
}

impl CommitOutcome {
    pub fn snapshot(&self) -> LedgerSnapshot {
        match self {
            CommitOutcome::Applied(s) | CommitOutcome::Replayed(s) => *s,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, CommitOutcome::Applied(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommitOutcome::Applied(_) => "applied",
            CommitOutcome::Replayed(_) => "replayed",
        }
    }
}

/// Computes the snapshot after one purchase, enforcing the inventory floor.
///
/// Inventory and balance are derived together so no caller can apply one
/// without the other. The balance has no floor but must stay representable.
pub fn apply_purchase(current: LedgerSnapshot, purchase: Purchase) -> Result<LedgerSnapshot> {
    if current.inventory <= 0 {
        return Err(LedgerError::InsufficientInventory);
    }
    let balance = current
        .balance
        .checked_sub(purchase.charge)
        .ok_or(LedgerError::BalanceOverflow {
            balance: current.balance,
            charge: purchase.charge,
        })?;
    Ok(LedgerSnapshot::new(current.inventory - 1, balance))
}

/// Persistent inventory/balance ledger, one per purchase path.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Reads the current inventory and balance of a path's ledger.
    async fn read(&self, path: PurchasePath) -> Result<LedgerSnapshot>;

    /// Applies one purchase to a path's ledger.
    ///
    /// With no key the mutation is always applied. With a key on the
    /// protected path, an already-recorded key returns the current snapshot
    /// as [`CommitOutcome::Replayed`]; otherwise the key is recorded and the
    /// mutation applied in one atomic step. A key on the unprotected path is
    /// ignored.
    ///
    /// Fails with [`LedgerError::InsufficientInventory`] when inventory is
    /// zero, in which case the key is not recorded either.
    async fn try_commit(
        &self,
        path: PurchasePath,
        key: Option<&IdempotencyKey>,
        purchase: Purchase,
    ) -> Result<CommitOutcome>;

    /// Returns true if the protected ledger has already applied this key.
    async fn has_key(&self, key: &IdempotencyKey) -> Result<bool>;

    /// Resets both ledgers to the seed and forgets every idempotency key.
    async fn provision(&self, seed: LedgerSeed) -> Result<()>;
}

/// Simulated crash switch consulted before a purchase commits.
#[async_trait]
pub trait FaultFlag: Send + Sync {
    /// Returns the current value. A toggle is visible to the next call.
    async fn is_set(&self) -> Result<bool>;

    /// Sets the flag.
    async fn set(&self, crashed: bool) -> Result<()>;

    /// Flips the flag and returns the new value.
    async fn toggle(&self) -> Result<bool>;
}

/// Provisions the ledgers only when a path has no ledger row yet.
///
/// Returns true if it provisioned. Any other read failure is returned as is;
/// provisioning wipes the idempotency keys, so an existing ledger must never
/// be reseeded because of a transient error.
pub async fn provision_if_missing<S>(store: &S, seed: LedgerSeed) -> Result<bool>
where
    S: LedgerStore + ?Sized,
{
    for path in [PurchasePath::Protected, PurchasePath::Unprotected] {
        match store.read(path).await {
            Ok(_) => {}
            Err(LedgerError::Corrupt(reason)) => {
                tracing::info!(%path, %reason, "ledger missing, provisioning");
                store.provision(seed).await?;
                return Ok(true);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(false)
}

#[async_trait]
impl<T: LedgerStore + ?Sized> LedgerStore for Arc<T> {
    async fn read(&self, path: PurchasePath) -> Result<LedgerSnapshot> {
        (**self).read(path).await
    }

    async fn try_commit(
        &self,
        path: PurchasePath,
        key: Option<&IdempotencyKey>,
        purchase: Purchase,
    ) -> Result<CommitOutcome> {
        (**self).try_commit(path, key, purchase).await
    }

    async fn has_key(&self, key: &IdempotencyKey) -> Result<bool> {
        (**self).has_key(key).await
    }

    async fn provision(&self, seed: LedgerSeed) -> Result<()> {
        (**self).provision(seed).await
    }
}

#[async_trait]
impl<T: FaultFlag + ?Sized> FaultFlag for Arc<T> {
    async fn is_set(&self) -> Result<bool> {
        (**self).is_set().await
    }

    async fn set(&self, crashed: bool) -> Result<()> {
        (**self).set(crashed).await
    }

    async fn toggle(&self) -> Result<bool> {
        (**self).toggle().await
    }
}
