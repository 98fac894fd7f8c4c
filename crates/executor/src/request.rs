//! Request and response shapes exchanged with the purchase function.

use common::{IdempotencyKey, LedgerSnapshot, PurchasePath};
use serde::{Deserialize, Serialize};

/// One confirmation attempt as sent to the purchase function.
///
/// The coordinator builds this once per confirmation and resends the same
/// value on every retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub path: PurchasePath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<IdempotencyKey>,
}

impl PurchaseRequest {
    /// A request for the protected function carrying `key`.
    pub fn protected(key: IdempotencyKey) -> Self {
        Self {
            path: PurchasePath::Protected,
            idempotency_key: Some(key),
        }
    }

    /// A request for the unprotected function. It never carries a key.
    pub fn unprotected() -> Self {
        Self {
            path: PurchasePath::Unprotected,
            idempotency_key: None,
        }
    }

    /// Builds the request for `path`, minting a key only when protected.
    pub fn for_path(path: PurchasePath) -> Self {
        match path {
            PurchasePath::Protected => Self::protected(IdempotencyKey::new()),
            PurchasePath::Unprotected => Self::unprotected(),
        }
    }
}

/// Serializes a snapshot the way the purchase function returns it.
///
/// With `double_encode` the JSON object is serialized a second time into a
/// JSON string, which is what the deployed function actually sends back.
pub fn encode_response(
    snapshot: &LedgerSnapshot,
    double_encode: bool,
) -> serde_json::Result<Vec<u8>> {
    let once = serde_json::to_string(snapshot)?;
    if double_encode {
        serde_json::to_vec(&once)
    } else {
        Ok(once.into_bytes())
    }
}
