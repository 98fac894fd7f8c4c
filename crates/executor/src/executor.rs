//! Purchase executor trait and in-process implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ledger::{FaultFlag, LedgerStore, Purchase};

use crate::error::{InvokeError, Result};
use crate::request::{PurchaseRequest, encode_response};

/// Where a set fault flag aborts a protected invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrashPoint {
    /// The ledger is left untouched.
    BeforeCommit,
    /// The commit lands but the response never reaches the caller.
    #[default]
    AfterCommit,
}

/// Tunables of the simulated purchase function.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Amount deducted from the balance per unit.
    pub unit_price: i64,
    /// Crash point for the protected function. The unprotected function
    /// always crashes after committing.
    pub crash_point: CrashPoint,
    /// Return the snapshot serialized twice, as the deployed function does.
    pub double_encode_response: bool,
    /// Simulated round-trip time added to every invocation.
    pub latency: Duration,
}

impl ExecutorConfig {
    pub const DEFAULT_UNIT_PRICE: i64 = 10;
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            unit_price: Self::DEFAULT_UNIT_PRICE,
            crash_point: CrashPoint::default(),
            double_encode_response: true,
            latency: Duration::ZERO,
        }
    }
}

/// Remote purchase function, as seen by the invoking process.
///
/// On success returns the raw response payload; decoding it is the caller's job.
#[async_trait]
pub trait PurchaseExecutor: Send + Sync {
    async fn invoke(&self, request: &PurchaseRequest) -> Result<Vec<u8>>;
}

#[async_trait]
impl<T: PurchaseExecutor + ?Sized> PurchaseExecutor for Arc<T> {
    async fn invoke(&self, request: &PurchaseRequest) -> Result<Vec<u8>> {
        (**self).invoke(request).await
    }
}

/// Purchase function running in-process against a ledger and a fault flag.
#[derive(Clone)]
pub struct LocalPurchaseExecutor<L, F>
where
    L: LedgerStore,
    F: FaultFlag,
{
    ledger: L,
    fault: F,
    config: ExecutorConfig,
    invocations: Arc<AtomicUsize>,
}

impl<L, F> LocalPurchaseExecutor<L, F>
where
    L: LedgerStore,
    F: FaultFlag,
{
    /// Creates a new executor with the default configuration.
    pub fn new(ledger: L, fault: F) -> Self {
        Self::with_config(ledger, fault, ExecutorConfig::default())
    }

    pub fn with_config(ledger: L, fault: F, config: ExecutorConfig) -> Self {
        Self {
            ledger,
            fault,
            config,
            invocations: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn fault_flag(&self) -> &F {
        &self.fault
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Returns how many times the function has been invoked.
    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<L, F> PurchaseExecutor for LocalPurchaseExecutor<L, F>
where
    L: LedgerStore,
    F: FaultFlag,
{
    #[tracing::instrument(skip(self), fields(path = %request.path))]
    async fn invoke(&self, request: &PurchaseRequest) -> Result<Vec<u8>> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        metrics::counter!("executor_invocations_total", "path" => request.path.as_str())
            .increment(1);

        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }

        // The flag is read once, before committing; a toggle racing the
        // commit below is an accepted source of nondeterminism.
        let crashed = self.fault.is_set().await?;
        let crash_point = if request.path.is_protected() {
            self.config.crash_point
        } else {
            CrashPoint::AfterCommit
        };

        if crashed && crash_point == CrashPoint::BeforeCommit {
            tracing::warn!("function crashed before commit");
            return Err(InvokeError::Transport(
                "function crashed before commit".to_string(),
            ));
        }

        let outcome = self
            .ledger
            .try_commit(
                request.path,
                request.idempotency_key.as_ref(),
                Purchase::new(self.config.unit_price),
            )
            .await?;

        if crashed {
            tracing::warn!(
                committed = outcome.was_applied(),
                "function crashed after commit, response lost"
            );
            return Err(InvokeError::Transport(
                "function crashed after commit, response lost".to_string(),
            ));
        }

        tracing::debug!(outcome = outcome.as_str(), snapshot = %outcome.snapshot(), "purchase handled");
        encode_response(&outcome.snapshot(), self.config.double_encode_response)
            .map_err(|e| InvokeError::Transport(format!("response encoding failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{IdempotencyKey, LedgerSnapshot, PurchasePath};
    use ledger::{InMemoryFaultFlag, InMemoryLedgerStore, LedgerSeed};

    fn setup(
        seed: LedgerSeed,
        config: ExecutorConfig,
    ) -> (
        LocalPurchaseExecutor<InMemoryLedgerStore, InMemoryFaultFlag>,
        InMemoryLedgerStore,
        InMemoryFaultFlag,
    ) {
        let ledger = InMemoryLedgerStore::with_seed(seed);
        let fault = InMemoryFaultFlag::new();
        let executor = LocalPurchaseExecutor::with_config(ledger.clone(), fault.clone(), config);
        (executor, ledger, fault)
    }

    fn single_encoded() -> ExecutorConfig {
        ExecutorConfig {
            double_encode_response: false,
            ..ExecutorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_healthy_invocation_returns_snapshot() {
        let (executor, _, _) = setup(LedgerSeed::new(1, 100), single_encoded());

        let payload = executor
            .invoke(&PurchaseRequest::unprotected())
            .await
            .unwrap();

        let snapshot: LedgerSnapshot = serde_json::from_slice(&payload).unwrap();
        assert_eq!(snapshot, LedgerSnapshot::new(0, 90));
        assert_eq!(executor.invocation_count(), 1);
    }

    #[tokio::test]
    async fn test_default_response_is_double_encoded() {
        let (executor, _, _) = setup(LedgerSeed::new(1, 100), ExecutorConfig::default());

        let payload = executor
            .invoke(&PurchaseRequest::unprotected())
            .await
            .unwrap();

        let inner: String = serde_json::from_slice(&payload).unwrap();
        let snapshot: LedgerSnapshot = serde_json::from_str(&inner).unwrap();
        assert_eq!(snapshot, LedgerSnapshot::new(0, 90));
    }

    #[tokio::test]
    async fn test_crash_on_unprotected_path_commits_then_fails() {
        let (executor, ledger, fault) = setup(LedgerSeed::new(5, 100), single_encoded());
        fault.set(true).await.unwrap();

        let result = executor.invoke(&PurchaseRequest::unprotected()).await;

        assert!(matches!(result, Err(InvokeError::Transport(_))));
        assert_eq!(
            ledger.read(PurchasePath::Unprotected).await.unwrap(),
            LedgerSnapshot::new(4, 90)
        );
    }

    #[tokio::test]
    async fn test_crash_after_commit_on_protected_path_records_key() {
        let (executor, ledger, fault) = setup(LedgerSeed::new(5, 100), single_encoded());
        let key = IdempotencyKey::from("k1");
        fault.set(true).await.unwrap();

        let result = executor.invoke(&PurchaseRequest::protected(key.clone())).await;

        assert!(matches!(result, Err(InvokeError::Transport(_))));
        assert!(ledger.has_key(&key).await.unwrap());
        assert_eq!(
            ledger.read(PurchasePath::Protected).await.unwrap(),
            LedgerSnapshot::new(4, 90)
        );
    }

    #[tokio::test]
    async fn test_crash_before_commit_leaves_ledger_untouched() {
        let config = ExecutorConfig {
            crash_point: CrashPoint::BeforeCommit,
            ..single_encoded()
        };
        let (executor, ledger, fault) = setup(LedgerSeed::new(5, 100), config);
        let key = IdempotencyKey::from("k1");
        fault.set(true).await.unwrap();

        let result = executor.invoke(&PurchaseRequest::protected(key.clone())).await;

        assert!(matches!(result, Err(InvokeError::Transport(_))));
        assert!(!ledger.has_key(&key).await.unwrap());
        assert_eq!(
            ledger.read(PurchasePath::Protected).await.unwrap(),
            LedgerSnapshot::new(5, 100)
        );
    }

    #[tokio::test]
    async fn test_before_commit_crash_point_does_not_apply_to_unprotected_path() {
        let config = ExecutorConfig {
            crash_point: CrashPoint::BeforeCommit,
            ..single_encoded()
        };
        let (executor, ledger, fault) = setup(LedgerSeed::new(5, 100), config);
        fault.set(true).await.unwrap();

        let _ = executor.invoke(&PurchaseRequest::unprotected()).await;

        assert_eq!(
            ledger.read(PurchasePath::Unprotected).await.unwrap(),
            LedgerSnapshot::new(4, 90)
        );
    }

    #[tokio::test]
    async fn test_empty_inventory_is_rejected() {
        let (executor, ledger, _) = setup(LedgerSeed::new(0, 100), single_encoded());

        let result = executor.invoke(&PurchaseRequest::unprotected()).await;

        assert!(matches!(result, Err(InvokeError::InsufficientInventory)));
        assert_eq!(
            ledger.read(PurchasePath::Unprotected).await.unwrap(),
            LedgerSnapshot::new(0, 100)
        );
    }

    #[tokio::test]
    async fn test_unavailable_ledger_never_reports_success() {
        let (executor, ledger, _) = setup(LedgerSeed::new(5, 100), single_encoded());
        ledger.set_unavailable(true).await;

        let result = executor.invoke(&PurchaseRequest::unprotected()).await;

        assert!(matches!(result, Err(InvokeError::StorageUnavailable(_))));
    }

    #[tokio::test]
    async fn test_replay_after_lost_response_returns_current_snapshot() {
        let (executor, _, fault) = setup(LedgerSeed::new(1, 100), single_encoded());
        let request = PurchaseRequest::protected(IdempotencyKey::from("k1"));

        fault.set(true).await.unwrap();
        assert!(executor.invoke(&request).await.is_err());
        fault.set(false).await.unwrap();

        let payload = executor.invoke(&request).await.unwrap();
        let snapshot: LedgerSnapshot = serde_json::from_slice(&payload).unwrap();
        assert_eq!(snapshot, LedgerSnapshot::new(0, 90));
    }
}
