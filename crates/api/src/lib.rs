//! HTTP API for the purchase demo.
//!
//! Exposes the retried purchase confirmation for the protected and
//! unprotected paths, the crash and protection toggles, ledger provisioning,
//! and a server-sent event stream of progress notices. Requests are traced
//! and metrics are served in Prometheus format.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use axum::Router;
use axum::routing::{get, post};
use coordinator::{NoticeBoard, RetryCoordinator};
use executor::LocalPurchaseExecutor;
use ledger::{InMemoryFaultFlag, InMemoryLedgerStore};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::purchase::{AppState, SharedFaultFlag, SharedLedger};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/data", post(routes::purchase::data))
        .route("/confirmPayment", post(routes::purchase::confirm_payment))
        .route("/toggleCrash", post(routes::purchase::toggle_crash))
        .route("/toggleProtection", post(routes::purchase::toggle_protection))
        .route("/createTables", post(routes::purchase::create_tables))
        .route("/logs", post(routes::logs::publish))
        .route("/logs/stream", get(routes::logs::stream))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires a ledger and fault flag into an executor, a coordinator and the shared state.
///
/// Starts on the protected path.
pub fn create_state(
    config: &Config,
    ledger: SharedLedger,
    fault: SharedFaultFlag,
    backend: &'static str,
) -> Arc<AppState> {
    let notices = NoticeBoard::new();
    let executor =
        LocalPurchaseExecutor::with_config(ledger.clone(), fault.clone(), config.executor_config());
    let coordinator = RetryCoordinator::new(executor, config.retry_policy(), notices.clone());

    Arc::new(AppState {
        coordinator,
        ledger,
        fault,
        notices,
        use_protection: AtomicBool::new(true),
        seed: config.ledger_seed(),
        confirm_timeout: config.confirm_timeout(),
        backend,
    })
}

/// Creates state backed by in-memory ledgers seeded from `config`.
pub fn create_in_memory_state(config: &Config) -> Arc<AppState> {
    let ledger: SharedLedger = Arc::new(InMemoryLedgerStore::with_seed(config.ledger_seed()));
    let fault: SharedFaultFlag = Arc::new(InMemoryFaultFlag::new());
    create_state(config, ledger, fault, "memory")
}
