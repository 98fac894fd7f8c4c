use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{IdempotencyKey, LedgerSnapshot, PurchasePath};
use tokio::sync::RwLock;

use crate::{
    LedgerError, Result,
    store::{CommitOutcome, FaultFlag, LedgerSeed, LedgerStore, Purchase, apply_purchase},
};

#[derive(Debug)]
struct InMemoryLedgerState {
    protected: LedgerSnapshot,
    unprotected: LedgerSnapshot,
    keys: HashSet<IdempotencyKey>,
    unavailable: bool,
}

impl InMemoryLedgerState {
    fn seeded(seed: LedgerSeed) -> Self {
        Self {
            protected: LedgerSnapshot::new(seed.inventory, seed.balance),
            unprotected: LedgerSnapshot::new(seed.inventory, seed.balance),
            keys: HashSet::new(),
            unavailable: false,
        }
    }

    fn ledger_mut(&mut self, path: PurchasePath) -> &mut LedgerSnapshot {
        match path {
            PurchasePath::Protected => &mut self.protected,
            PurchasePath::Unprotected => &mut self.unprotected,
        }
    }

    fn ledger(&self, path: PurchasePath) -> LedgerSnapshot {
        match path {
            PurchasePath::Protected => self.protected,
            PurchasePath::Unprotected => self.unprotected,
        }
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(LedgerError::Unavailable(
                "in-memory ledger marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

/// In-memory ledger store for tests and the database-less server.
///
/// The whole check-insert-mutate sequence runs under one write lock, so two
/// commits carrying the same key can never both see it absent.
#[derive(Debug, Clone)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<InMemoryLedgerState>>,
}

impl InMemoryLedgerStore {
    /// Creates a store seeded with the default inventory and balance.
    pub fn new() -> Self {
        Self::with_seed(LedgerSeed::default())
    }

    /// Creates a store with both ledgers set to `seed`.
    pub fn with_seed(seed: LedgerSeed) -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryLedgerState::seeded(seed))),
        }
    }

    /// Makes every subsequent operation fail with `Unavailable` until cleared.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Returns the number of recorded idempotency keys.
    pub async fn key_count(&self) -> usize {
        self.state.read().await.keys.len()
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn read(&self, path: PurchasePath) -> Result<LedgerSnapshot> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state.ledger(path))
    }

    async fn try_commit(
        &self,
        path: PurchasePath,
        key: Option<&IdempotencyKey>,
        purchase: Purchase,
    ) -> Result<CommitOutcome> {
        let mut state = self.state.write().await;
        state.check_available()?;

        let guard_key = match (path, key) {
            (PurchasePath::Protected, Some(key)) => Some(key),
            (PurchasePath::Unprotected, Some(key)) => {
                tracing::debug!(%key, "ignoring idempotency key on unprotected ledger");
                None
            }
            (_, None) => None,
        };

        if let Some(key) = guard_key
            && state.keys.contains(key)
        {
            let snapshot = state.ledger(path);
            metrics::counter!("ledger_commits_total", "path" => path.as_str(), "result" => "replayed")
                .increment(1);
            tracing::info!(%key, %snapshot, "purchase already applied, replaying snapshot");
            return Ok(CommitOutcome::Replayed(snapshot));
        }

        let after = match apply_purchase(state.ledger(path), purchase) {
            Ok(after) => after,
            Err(e) => {
                metrics::counter!("ledger_commits_total", "path" => path.as_str(), "result" => "rejected")
                    .increment(1);
                return Err(e);
            }
        };

        if let Some(key) = guard_key {
            state.keys.insert(key.clone());
        }
        *state.ledger_mut(path) = after;

        metrics::counter!("ledger_commits_total", "path" => path.as_str(), "result" => "applied")
            .increment(1);
        tracing::debug!(%path, snapshot = %after, "purchase applied");
        Ok(CommitOutcome::Applied(after))
    }

    async fn has_key(&self, key: &IdempotencyKey) -> Result<bool> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state.keys.contains(key))
    }

    async fn provision(&self, seed: LedgerSeed) -> Result<()> {
        let mut state = self.state.write().await;
        *state = InMemoryLedgerState::seeded(seed);
        tracing::info!(
            inventory = seed.inventory,
            balance = seed.balance,
            "ledgers provisioned"
        );
        Ok(())
    }
}

/// Process-local fault flag.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFaultFlag {
    crashed: Arc<AtomicBool>,
}

impl InMemoryFaultFlag {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FaultFlag for InMemoryFaultFlag {
    async fn is_set(&self) -> Result<bool> {
        Ok(self.crashed.load(Ordering::SeqCst))
    }

    async fn set(&self, crashed: bool) -> Result<()> {
        self.crashed.store(crashed, Ordering::SeqCst);
        Ok(())
    }

    async fn toggle(&self) -> Result<bool> {
        // fetch_xor returns the previous value
        Ok(!self.crashed.fetch_xor(true, Ordering::SeqCst))
    }
}
