//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::routes::purchase::{SharedFaultFlag, SharedLedger};
use ledger::{PostgresFaultFlag, PostgresLedgerStore, provision_if_missing};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Connects to PostgreSQL, applies migrations and provisions the ledgers on first use.
async fn connect_postgres(url: &str, config: &Config) -> (SharedLedger, SharedFaultFlag) {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .expect("failed to connect to PostgreSQL");

    let store = PostgresLedgerStore::new(pool.clone());
    store
        .run_migrations()
        .await
        .expect("failed to run migrations");

    let provisioned = provision_if_missing(&store, config.ledger_seed())
        .await
        .expect("failed to read ledgers at startup");
    if provisioned {
        tracing::info!("ledgers were missing and have been provisioned");
    }

    (Arc::new(store), Arc::new(PostgresFaultFlag::new(pool)))
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the ledger backend and build application state
    let state = match config.database_url.as_deref() {
        Some(url) => {
            let (ledger, fault) = connect_postgres(url, &config).await;
            api::create_state(&config, ledger, fault, "postgres")
        }
        None => api::create_in_memory_state(&config),
    };
    tracing::info!(backend = state.backend, seed = ?state.seed, "ledger ready");

    // 4. Build the application
    let app = api::create_app(state, metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
