//! Purchase, fault-toggle and provisioning endpoints.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use common::{LedgerSnapshot, PurchasePath};
use coordinator::{ConfirmOptions, NoticeBoard, RetryCoordinator};
use executor::LocalPurchaseExecutor;
use ledger::{FaultFlag, LedgerSeed, LedgerStore};
use serde::Serialize;

use crate::error::ApiError;

pub type SharedLedger = Arc<dyn LedgerStore>;
pub type SharedFaultFlag = Arc<dyn FaultFlag>;
pub type SharedExecutor = LocalPurchaseExecutor<SharedLedger, SharedFaultFlag>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub coordinator: RetryCoordinator<SharedExecutor>,
    pub ledger: SharedLedger,
    pub fault: SharedFaultFlag,
    pub notices: NoticeBoard,
    /// Selects the purchase path used by `/data` and `/confirmPayment`.
    pub use_protection: AtomicBool,
    pub seed: LedgerSeed,
    pub confirm_timeout: Duration,
    pub backend: &'static str,
}

impl AppState {
    pub fn selected_path(&self) -> PurchasePath {
        PurchasePath::from_protection(self.use_protection.load(Ordering::SeqCst))
    }
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataView {
    pub inventory: i64,
    pub balance: i64,
    pub use_protection: bool,
    pub crashed: bool,
}

#[derive(Serialize)]
pub struct DataResponse {
    pub result: DataView,
}

#[derive(Serialize)]
pub struct ConfirmResponse {
    pub inventory: i64,
    pub balance: i64,
    pub attempts: u32,
}

#[derive(Serialize)]
pub struct CrashResponse {
    pub crashed: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionResponse {
    pub use_protection: bool,
}

#[derive(Serialize)]
pub struct OkResponse {
    pub ok: &'static str,
}

// -- Handlers --

/// POST /data: current ledger of the selected path plus both toggles.
#[tracing::instrument(skip(state))]
pub async fn data(State(state): State<Arc<AppState>>) -> Result<Json<DataResponse>, ApiError> {
    let use_protection = state.use_protection.load(Ordering::SeqCst);
    let LedgerSnapshot { inventory, balance } = state
        .ledger
        .read(PurchasePath::from_protection(use_protection))
        .await?;
    let crashed = state.fault.is_set().await?;

    Ok(Json(DataResponse {
        result: DataView {
            inventory,
            balance,
            use_protection,
            crashed,
        },
    }))
}

/// POST /confirmPayment: buys one unit on the selected path, retrying until it lands.
#[tracing::instrument(skip(state))]
pub async fn confirm_payment(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConfirmResponse>, ApiError> {
    let path = state.selected_path();
    state
        .notices
        .publish(format!("Confirming payment on the {path} path"));

    let options = ConfirmOptions::new().with_timeout(state.confirm_timeout);
    let confirmation = state.coordinator.confirm_with(path, options).await?;

    Ok(Json(ConfirmResponse {
        inventory: confirmation.snapshot.inventory,
        balance: confirmation.snapshot.balance,
        attempts: confirmation.attempts,
    }))
}

/// POST /toggleCrash: flips the simulated crash flag.
#[tracing::instrument(skip(state))]
pub async fn toggle_crash(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CrashResponse>, ApiError> {
    let crashed = state.fault.toggle().await?;
    metrics::counter!("fault_flag_toggles_total", "crashed" => crashed.to_string()).increment(1);
    state.notices.publish(if crashed {
        "Crash mode enabled"
    } else {
        "Crash mode disabled"
    });

    Ok(Json(CrashResponse { crashed }))
}

/// POST /toggleProtection: switches between the protected and unprotected path.
#[tracing::instrument(skip(state))]
pub async fn toggle_protection(State(state): State<Arc<AppState>>) -> Json<ProtectionResponse> {
    let use_protection = !state.use_protection.fetch_xor(true, Ordering::SeqCst);
    state.notices.publish(format!(
        "Now using the {} path",
        PurchasePath::from_protection(use_protection)
    ));

    Json(ProtectionResponse { use_protection })
}

/// POST /createTables: reseeds both ledgers, forgets every key and clears the crash flag.
#[tracing::instrument(skip(state))]
pub async fn create_tables(
    State(state): State<Arc<AppState>>,
) -> Result<Json<OkResponse>, ApiError> {
    state.ledger.provision(state.seed).await?;
    state.fault.set(false).await?;
    state.notices.publish(format!(
        "Ledgers provisioned with inventory={} balance={}",
        state.seed.inventory, state.seed.balance
    ));

    Ok(Json(OkResponse { ok: "ok" }))
}
