//! Defensive decoding of purchase responses.

use common::LedgerSnapshot;
use serde_json::Value;

use crate::error::{ConfirmError, Result};

/// Maximum number of JSON decode passes applied to one response.
///
/// The function serializes its snapshot once but the payload may arrive
/// wrapped in a second JSON string.
pub const MAX_DECODE_PASSES: usize = 2;

/// Decodes a response payload into a snapshot, unwrapping at most one
/// extra layer of string encoding.
pub fn decode_snapshot(payload: &[u8]) -> Result<LedgerSnapshot> {
    let mut value: Value = serde_json::from_slice(payload)?;
    let mut passes = 1;

    loop {
        match value {
            Value::Object(_) => return Ok(serde_json::from_value(value)?),
            Value::String(inner) if passes < MAX_DECODE_PASSES => {
                value = serde_json::from_str(&inner)?;
                passes += 1;
            }
            other => {
                return Err(ConfirmError::ProtocolError(format!(
                    "expected a ledger snapshot object after {passes} decode pass(es), got {}",
                    kind(&other)
                )));
            }
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
