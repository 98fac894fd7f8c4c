//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p ledger --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use ledger::{
    CommitOutcome, FaultFlag, IdempotencyKey, LedgerError, LedgerSeed, LedgerSnapshot,
    LedgerStore, PostgresFaultFlag, PostgresLedgerStore, Purchase, PurchasePath,
    provision_if_missing,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_ledger_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh pool without touching stored state
async fn reconnect() -> (PostgresLedgerStore, PostgresFaultFlag) {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(&info.connection_string)
        .await
        .unwrap();

    (
        PostgresLedgerStore::new(pool.clone()),
        PostgresFaultFlag::new(pool),
    )
}

/// Get a fresh pool with both ledgers reseeded
async fn get_test_store(seed: LedgerSeed) -> (PostgresLedgerStore, PostgresFaultFlag) {
    let (store, flag) = reconnect().await;
    store.provision(seed).await.unwrap();
    flag.set(false).await.unwrap();

    (store, flag)
}

#[tokio::test]
async fn test_provision_and_read() {
    let (store, _) = get_test_store(LedgerSeed::new(100, 1000)).await;

    let snapshot = store.read(PurchasePath::Protected).await.unwrap();
    assert_eq!(snapshot, LedgerSnapshot::new(100, 1000));

    let snapshot = store.read(PurchasePath::Unprotected).await.unwrap();
    assert_eq!(snapshot, LedgerSnapshot::new(100, 1000));
}

#[tokio::test]
async fn test_protected_commit_applies_once() {
    let (store, _) = get_test_store(LedgerSeed::new(1, 100)).await;
    let key = IdempotencyKey::from("k1");

    let first = store
        .try_commit(PurchasePath::Protected, Some(&key), Purchase::new(10))
        .await
        .unwrap();
    let second = store
        .try_commit(PurchasePath::Protected, Some(&key), Purchase::new(10))
        .await
        .unwrap();

    assert_eq!(first, CommitOutcome::Applied(LedgerSnapshot::new(0, 90)));
    assert_eq!(second, CommitOutcome::Replayed(LedgerSnapshot::new(0, 90)));
    assert!(store.has_key(&key).await.unwrap());
}

#[tokio::test]
async fn test_unprotected_commit_applies_every_time() {
    let (store, _) = get_test_store(LedgerSeed::new(5, 100)).await;

    for _ in 0..2 {
        store
            .try_commit(PurchasePath::Unprotected, None, Purchase::new(10))
            .await
            .unwrap();
    }

    let snapshot = store.read(PurchasePath::Unprotected).await.unwrap();
    assert_eq!(snapshot, LedgerSnapshot::new(3, 80));
}

#[tokio::test]
async fn test_rejection_rolls_back_key() {
    let (store, _) = get_test_store(LedgerSeed::new(0, 100)).await;
    let key = IdempotencyKey::from("empty");

    let result = store
        .try_commit(PurchasePath::Protected, Some(&key), Purchase::new(10))
        .await;

    assert!(matches!(result, Err(LedgerError::InsufficientInventory)));
    assert!(!store.has_key(&key).await.unwrap());
    let snapshot = store.read(PurchasePath::Protected).await.unwrap();
    assert_eq!(snapshot, LedgerSnapshot::new(0, 100));
}

#[tokio::test]
async fn test_concurrent_same_key_commits_apply_once() {
    let (store, _) = get_test_store(LedgerSeed::new(50, 500)).await;
    let key = IdempotencyKey::from("race");

    let mut handles = Vec::new();
    for _ in 0..6 {
        let store = store.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            store
                .try_commit(PurchasePath::Protected, Some(&key), Purchase::new(10))
                .await
                .unwrap()
        }));
    }

    let mut applied = 0;
    for handle in handles {
        if handle.await.unwrap().was_applied() {
            applied += 1;
        }
    }

    assert_eq!(applied, 1);
    let snapshot = store.read(PurchasePath::Protected).await.unwrap();
    assert_eq!(snapshot, LedgerSnapshot::new(49, 490));
}

#[tokio::test]
async fn test_fault_flag_toggle() {
    let (_, flag) = get_test_store(LedgerSeed::default()).await;

    assert!(!flag.is_set().await.unwrap());
    assert!(flag.toggle().await.unwrap());
    assert!(flag.is_set().await.unwrap());
    assert!(!flag.toggle().await.unwrap());
}

#[tokio::test]
async fn test_startup_keeps_a_seeded_ledger() {
    let (store, _) = get_test_store(LedgerSeed::new(5, 100)).await;
    let key = IdempotencyKey::from("startup-k1");
    store
        .try_commit(PurchasePath::Protected, Some(&key), Purchase::new(10))
        .await
        .unwrap();

    let provisioned = provision_if_missing(&store, LedgerSeed::new(100, 1000))
        .await
        .unwrap();

    assert!(!provisioned);
    assert_eq!(
        store.read(PurchasePath::Protected).await.unwrap(),
        LedgerSnapshot::new(4, 90)
    );
    assert!(store.has_key(&key).await.unwrap());
}

#[tokio::test]
async fn test_startup_provisions_missing_ledger() {
    let (store, _) = get_test_store(LedgerSeed::new(5, 100)).await;
    sqlx::query("DELETE FROM balance WHERE path = 'unprotected'")
        .execute(store.pool())
        .await
        .unwrap();
    sqlx::query("DELETE FROM inventory WHERE path = 'unprotected'")
        .execute(store.pool())
        .await
        .unwrap();
    assert!(matches!(
        store.read(PurchasePath::Unprotected).await,
        Err(LedgerError::Corrupt(_))
    ));

    let provisioned = provision_if_missing(&store, LedgerSeed::new(7, 70))
        .await
        .unwrap();

    assert!(provisioned);
    assert_eq!(
        store.read(PurchasePath::Unprotected).await.unwrap(),
        LedgerSnapshot::new(7, 70)
    );
}

#[tokio::test]
async fn test_startup_propagates_connection_failure() {
    let (store, _) = get_test_store(LedgerSeed::new(5, 100)).await;
    let key = IdempotencyKey::from("startup-k2");
    store
        .try_commit(PurchasePath::Protected, Some(&key), Purchase::new(10))
        .await
        .unwrap();

    let closed = PostgresLedgerStore::new(store.pool().clone());
    closed.pool().close().await;

    let result = provision_if_missing(&closed, LedgerSeed::new(100, 1000)).await;
    assert!(matches!(result, Err(LedgerError::Database(_))));

    let (reopened, _) = reconnect().await;
    assert_eq!(
        reopened.read(PurchasePath::Protected).await.unwrap(),
        LedgerSnapshot::new(4, 90)
    );
    assert!(reopened.has_key(&key).await.unwrap());
}
