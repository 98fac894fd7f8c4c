//! Retry-invocation coordinator for purchase confirmations.
//!
//! A confirmation invokes the purchase function until it observes a
//! definitive outcome:
//! 1. Build one request (minting one idempotency key on the protected path)
//! 2. Invoke; on a transient failure back off and resend the same request
//! 3. Stop on success, on the out-of-stock rejection, or when the retry
//!    ceiling, the deadline or a cancellation ends the loop
//!
//! The coordinator never learns whether a failed attempt committed; only
//! the idempotency key makes the retry safe.

pub mod coordinator;
pub mod decode;
pub mod error;
pub mod notices;
pub mod policy;
pub mod state;

pub use coordinator::{ConfirmOptions, Confirmation, RetryCoordinator};
pub use decode::{MAX_DECODE_PASSES, decode_snapshot};
pub use error::ConfirmError;
pub use notices::{Notice, NoticeBoard};
pub use policy::RetryPolicy;
pub use state::ConfirmationState;
pub use tokio_util::sync::CancellationToken;
