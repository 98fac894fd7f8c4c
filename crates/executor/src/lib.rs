//! The purchase function invoked by the coordinator.
//!
//! [`PurchaseExecutor`] is the remote-invocation seam. [`LocalPurchaseExecutor`]
//! plays the remote function in-process: it reads the fault flag, commits to
//! the ledger and, when the flag is set, loses the response the way a crashed
//! function would.

pub mod error;
pub mod executor;
pub mod request;

pub use error::{InvokeError, Result};
pub use executor::{CrashPoint, ExecutorConfig, LocalPurchaseExecutor, PurchaseExecutor};
pub use request::{PurchaseRequest, encode_response};
