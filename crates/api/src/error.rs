//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use coordinator::ConfirmError;
use ledger::LedgerError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Confirmation ended without a snapshot.
    Confirm(ConfirmError),
    /// Direct ledger or fault-flag access failed.
    Ledger(LedgerError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Confirm(err) => confirm_error_to_response(err),
            ApiError::Ledger(err) => ledger_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn confirm_error_to_response(err: ConfirmError) -> (StatusCode, String) {
    match &err {
        ConfirmError::InsufficientInventory => (StatusCode::CONFLICT, "out of stock".to_string()),
        ConfirmError::StorageUnavailable(_) | ConfirmError::Cancelled { .. } => {
            tracing::warn!(error = %err, "confirmation unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
        ConfirmError::ConfirmationTimedOut { .. } => {
            (StatusCode::GATEWAY_TIMEOUT, err.to_string())
        }
        ConfirmError::ProtocolError(_) => {
            tracing::error!(error = %err, "purchase function returned an undecodable response");
            (StatusCode::BAD_GATEWAY, err.to_string())
        }
    }
}

fn ledger_error_to_response(err: LedgerError) -> (StatusCode, String) {
    match &err {
        LedgerError::InsufficientInventory => (StatusCode::CONFLICT, "out of stock".to_string()),
        LedgerError::Unavailable(_) | LedgerError::Database(_) => {
            tracing::warn!(error = %err, "ledger unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
        LedgerError::Corrupt(_) | LedgerError::BalanceOverflow { .. } | LedgerError::Migration(_) => {
            tracing::error!(error = %err, "internal server error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<ConfirmError> for ApiError {
    fn from(err: ConfirmError) -> Self {
        ApiError::Confirm(err)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}
