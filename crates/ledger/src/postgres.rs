use async_trait::async_trait;
use common::{IdempotencyKey, LedgerSnapshot, PurchasePath};
use sqlx::{PgPool, Postgres, Transaction};

use crate::{
    LedgerError, Result,
    store::{CommitOutcome, FaultFlag, LedgerSeed, LedgerStore, Purchase, apply_purchase},
};

const FAULT_FLAG_ID: &str = "mode";

/// PostgreSQL-backed ledger store.
///
/// The key insert and both balance updates share one transaction; a
/// concurrent insert of the same key blocks on the primary key until the
/// first transaction finishes, then conflicts.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Creates a new PostgreSQL ledger store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    async fn read_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        path: PurchasePath,
        lock: bool,
    ) -> Result<LedgerSnapshot> {
        let sql = if lock {
            r#"
            SELECT i.count, b.amount
            FROM inventory i JOIN balance b ON b.path = i.path
            WHERE i.path = $1
            FOR UPDATE
            "#
        } else {
            r#"
            SELECT i.count, b.amount
            FROM inventory i JOIN balance b ON b.path = i.path
            WHERE i.path = $1
            "#
        };

        let row: Option<(i64, i64)> = sqlx::query_as(sql)
            .bind(path.as_str())
            .fetch_optional(&mut **tx)
            .await?;

        row.map(|(inventory, balance)| LedgerSnapshot::new(inventory, balance))
            .ok_or_else(|| LedgerError::Corrupt(format!("no ledger row for path '{path}'")))
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn read(&self, path: PurchasePath) -> Result<LedgerSnapshot> {
        let mut tx = self.pool.begin().await?;
        let snapshot = Self::read_in_tx(&mut tx, path, false).await?;
        tx.commit().await?;
        Ok(snapshot)
    }

    async fn try_commit(
        &self,
        path: PurchasePath,
        key: Option<&IdempotencyKey>,
        purchase: Purchase,
    ) -> Result<CommitOutcome> {
        let mut tx = self.pool.begin().await?;

        if path.is_protected()
            && let Some(key) = key
        {
            let inserted = sqlx::query(
                "INSERT INTO idempotency_keys (key) VALUES ($1) ON CONFLICT (key) DO NOTHING",
            )
            .bind(key.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if inserted == 0 {
                let snapshot = Self::read_in_tx(&mut tx, path, false).await?;
                tx.rollback().await?;
                metrics::counter!("ledger_commits_total", "path" => path.as_str(), "result" => "replayed")
                    .increment(1);
                tracing::info!(%key, %snapshot, "purchase already applied, replaying snapshot");
                return Ok(CommitOutcome::Replayed(snapshot));
            }
        }

        let current = Self::read_in_tx(&mut tx, path, true).await?;
        let after = match apply_purchase(current, purchase) {
            Ok(after) => after,
            Err(e) => {
                // rolling back also discards the key insert
                tx.rollback().await?;
                metrics::counter!("ledger_commits_total", "path" => path.as_str(), "result" => "rejected")
                    .increment(1);
                return Err(e);
            }
        };

        sqlx::query("UPDATE inventory SET count = $2 WHERE path = $1")
            .bind(path.as_str())
            .bind(after.inventory)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE balance SET amount = $2 WHERE path = $1")
            .bind(path.as_str())
            .bind(after.balance)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        metrics::counter!("ledger_commits_total", "path" => path.as_str(), "result" => "applied")
            .increment(1);
        tracing::debug!(%path, snapshot = %after, "purchase applied");
        Ok(CommitOutcome::Applied(after))
    }

    async fn has_key(&self, key: &IdempotencyKey) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM idempotency_keys WHERE key = $1)")
                .bind(key.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn provision(&self, seed: LedgerSeed) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for path in [PurchasePath::Protected, PurchasePath::Unprotected] {
            sqlx::query(
                r#"
                INSERT INTO inventory (path, count) VALUES ($1, $2)
                ON CONFLICT (path) DO UPDATE SET count = EXCLUDED.count
                "#,
            )
            .bind(path.as_str())
            .bind(seed.inventory)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO balance (path, amount) VALUES ($1, $2)
                ON CONFLICT (path) DO UPDATE SET amount = EXCLUDED.amount
                "#,
            )
            .bind(path.as_str())
            .bind(seed.balance)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM idempotency_keys")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(
            inventory = seed.inventory,
            balance = seed.balance,
            "ledgers provisioned"
        );
        Ok(())
    }
}

/// Fault flag persisted as a single row in `fault_flag`.
#[derive(Clone)]
pub struct PostgresFaultFlag {
    pool: PgPool,
}

impl PostgresFaultFlag {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FaultFlag for PostgresFaultFlag {
    async fn is_set(&self) -> Result<bool> {
        let crashed: Option<bool> =
            sqlx::query_scalar("SELECT crashed FROM fault_flag WHERE id = $1")
                .bind(FAULT_FLAG_ID)
                .fetch_optional(&self.pool)
                .await?;
        Ok(crashed.unwrap_or(false))
    }

    async fn set(&self, crashed: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fault_flag (id, crashed) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET crashed = EXCLUDED.crashed
            "#,
        )
        .bind(FAULT_FLAG_ID)
        .bind(crashed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn toggle(&self) -> Result<bool> {
        let crashed: Option<bool> = sqlx::query_scalar(
            "UPDATE fault_flag SET crashed = NOT crashed WHERE id = $1 RETURNING crashed",
        )
        .bind(FAULT_FLAG_ID)
        .fetch_optional(&self.pool)
        .await?;

        match crashed {
            Some(crashed) => Ok(crashed),
            None => {
                self.set(true).await?;
                Ok(true)
            }
        }
    }
}
