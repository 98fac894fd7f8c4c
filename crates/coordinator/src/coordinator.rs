//! Retry loop driving a purchase confirmation to a terminal outcome.

use std::time::Duration;

use common::{IdempotencyKey, LedgerSnapshot, PurchasePath};
use executor::{InvokeError, PurchaseExecutor, PurchaseRequest};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::decode::decode_snapshot;
use crate::error::ConfirmError;
use crate::notices::NoticeBoard;
use crate::policy::RetryPolicy;
use crate::state::ConfirmationState;

/// Caller-supplied bounds on one confirmation.
#[derive(Debug, Clone, Default)]
pub struct ConfirmOptions {
    /// No attempt is started, and no attempt is awaited, past this instant.
    pub deadline: Option<Instant>,
    /// Cancelling stops further attempts. It never undoes a committed purchase.
    pub cancel: CancellationToken,
}

impl ConfirmOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// A successful confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub path: PurchasePath,
    pub snapshot: LedgerSnapshot,
    /// Invocations made, the successful one included.
    pub attempts: u32,
    /// The key every attempt carried, on the protected path.
    pub idempotency_key: Option<IdempotencyKey>,
    pub state: ConfirmationState,
}

/// Why an attempt ended without an invocation result.
enum Interrupted {
    Cancelled,
    DeadlineExceeded,
}

/// Invokes the purchase function until it observes a definitive outcome.
///
/// Transient failures are retried with the identical request, so on the
/// protected path every attempt carries the same idempotency key.
pub struct RetryCoordinator<E>
where
    E: PurchaseExecutor,
{
    executor: E,
    policy: RetryPolicy,
    notices: NoticeBoard,
}

impl<E> RetryCoordinator<E>
where
    E: PurchaseExecutor,
{
    /// Creates a new coordinator.
    pub fn new(executor: E, policy: RetryPolicy, notices: NoticeBoard) -> Self {
        Self {
            executor,
            policy,
            notices,
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }

    /// Confirms one purchase and returns the resulting ledger snapshot.
    pub async fn confirm(&self, path: PurchasePath) -> Result<LedgerSnapshot, ConfirmError> {
        self.confirm_with(path, ConfirmOptions::default())
            .await
            .map(|confirmation| confirmation.snapshot)
    }

    /// Confirms one purchase within the given bounds.
    pub async fn confirm_with(
        &self,
        path: PurchasePath,
        options: ConfirmOptions,
    ) -> Result<Confirmation, ConfirmError> {
        self.confirm_request(PurchaseRequest::for_path(path), options)
            .await
    }

    /// Drives an already-built request to a terminal outcome.
    ///
    /// Use this to resume a confirmation with a key minted earlier.
    #[tracing::instrument(
        skip(self, request, options),
        fields(path = %request.path, key = ?request.idempotency_key)
    )]
    pub async fn confirm_request(
        &self,
        request: PurchaseRequest,
        options: ConfirmOptions,
    ) -> Result<Confirmation, ConfirmError> {
        let path = request.path;
        metrics::counter!("confirmations_total", "path" => path.as_str()).increment(1);
        let started = std::time::Instant::now();

        let result = self.run(&request, &options).await;

        metrics::histogram!("confirmation_duration_seconds", "path" => path.as_str())
            .record(started.elapsed().as_secs_f64());
        let outcome = match &result {
            Ok(_) => "succeeded",
            Err(e) => e.outcome(),
        };
        metrics::counter!("confirmation_outcomes_total", "path" => path.as_str(), "outcome" => outcome)
            .increment(1);

        result
    }

    async fn run(
        &self,
        request: &PurchaseRequest,
        options: &ConfirmOptions,
    ) -> Result<Confirmation, ConfirmError> {
        let path = request.path;
        let ceiling = self.policy.attempt_ceiling();
        let mut state = ConfirmationState::Idle;
        let mut attempts: u32 = 0;
        let mut last_failure: Option<InvokeError> = None;

        while state.can_invoke() {
            if options.cancel.is_cancelled() {
                return Err(terminate(&mut state, self.cancelled(attempts)));
            }
            if options.deadline_passed() {
                return Err(terminate(&mut state, self.timed_out(attempts, last_failure)));
            }

            attempts += 1;
            transition(&mut state, ConfirmationState::Invoking);
            metrics::counter!("confirmation_attempts_total", "path" => path.as_str()).increment(1);
            self.notices
                .publish(format!("Attempting to invoke {path} purchase function (attempt {attempts})"));

            let failure = match self.attempt(request, options).await {
                Ok(Ok(payload)) => {
                    let snapshot = match decode_snapshot(&payload) {
                        Ok(snapshot) => snapshot,
                        Err(e) => {
                            tracing::error!(error = %e, "undecodable purchase response");
                            self.notices
                                .publish(format!("Purchase response could not be decoded: {e}"));
                            return Err(terminate(&mut state, e));
                        }
                    };
                    transition(&mut state, ConfirmationState::Succeeded);
                    tracing::info!(attempts, %snapshot, "confirmation succeeded");
                    self.notices.publish(format!(
                        "Purchase confirmed after {attempts} attempt(s): {snapshot}"
                    ));
                    return Ok(Confirmation {
                        path,
                        snapshot,
                        attempts,
                        idempotency_key: request.idempotency_key.clone(),
                        state,
                    });
                }
                Ok(Err(InvokeError::InsufficientInventory)) => {
                    tracing::info!(attempts, "confirmation rejected, out of stock");
                    self.notices.publish("Purchase rejected: out of stock");
                    return Err(terminate(&mut state, ConfirmError::InsufficientInventory));
                }
                Ok(Err(e)) => e,
                Err(Interrupted::Cancelled) => {
                    return Err(terminate(&mut state, self.cancelled(attempts)));
                }
                Err(Interrupted::DeadlineExceeded) => {
                    return Err(terminate(&mut state, self.timed_out(attempts, last_failure)));
                }
            };

            if attempts >= ceiling {
                tracing::warn!(attempts, error = %failure, "retry ceiling reached");
                return Err(terminate(&mut state, self.timed_out(attempts, Some(failure))));
            }

            let delay = self.policy.delay_for(attempts);
            tracing::warn!(attempts, error = %failure, ?delay, "attempt failed, retrying");
            metrics::counter!("confirmation_retries_total", "path" => path.as_str()).increment(1);
            self.notices.publish(format!(
                "Function crashed while attempting to complete ({failure}), retry attempt {} in {}ms",
                attempts + 1,
                delay.as_millis()
            ));
            last_failure = Some(failure);

            if let Err(interrupted) = self.back_off(delay, options).await {
                let err = match interrupted {
                    Interrupted::Cancelled => self.cancelled(attempts),
                    Interrupted::DeadlineExceeded => self.timed_out(attempts, last_failure),
                };
                return Err(terminate(&mut state, err));
            }
        }

        // Every terminal transition above returns directly.
        Err(terminate(&mut state, self.timed_out(attempts, last_failure)))
    }

    /// Runs one invocation, bounded by the per-attempt timeout, the deadline
    /// and the cancellation token.
    async fn attempt(
        &self,
        request: &PurchaseRequest,
        options: &ConfirmOptions,
    ) -> Result<executor::Result<Vec<u8>>, Interrupted> {
        let call = async {
            match self.policy.attempt_timeout {
                Some(limit) => tokio::time::timeout(limit, self.executor.invoke(request))
                    .await
                    .unwrap_or_else(|_| {
                        Err(InvokeError::Transport(format!(
                            "no response within {}ms",
                            limit.as_millis()
                        )))
                    }),
                None => self.executor.invoke(request).await,
            }
        };

        tokio::select! {
            biased;
            () = options.cancel.cancelled() => Err(Interrupted::Cancelled),
            () = until(options.deadline) => Err(Interrupted::DeadlineExceeded),
            result = call => Ok(result),
        }
    }

    async fn back_off(&self, delay: Duration, options: &ConfirmOptions) -> Result<(), Interrupted> {
        tokio::select! {
            biased;
            () = options.cancel.cancelled() => Err(Interrupted::Cancelled),
            () = until(options.deadline) => Err(Interrupted::DeadlineExceeded),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn cancelled(&self, attempts: u32) -> ConfirmError {
        tracing::info!(attempts, "confirmation cancelled");
        self.notices
            .publish(format!("Confirmation cancelled after {attempts} attempt(s)"));
        ConfirmError::Cancelled { attempts }
    }

    fn timed_out(&self, attempts: u32, last_failure: Option<InvokeError>) -> ConfirmError {
        let err = match last_failure {
            Some(InvokeError::StorageUnavailable(reason)) => {
                ConfirmError::StorageUnavailable(reason)
            }
            _ => ConfirmError::ConfirmationTimedOut { attempts },
        };
        self.notices
            .publish(format!("Confirmation gave up after {attempts} attempt(s): {err}"));
        err
    }
}

fn transition(state: &mut ConfirmationState, next: ConfirmationState) {
    tracing::debug!(from = %state, to = %next, "confirmation state");
    *state = next;
}

/// Moves to the terminal state the error stands for.
fn terminate(state: &mut ConfirmationState, err: ConfirmError) -> ConfirmError {
    transition(state, err.state());
    err
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
