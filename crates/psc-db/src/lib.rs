//! psc-db
//!
//! Postgres persistence for the payment split connector: the checkpoint
//! store (`connector_config`), the transfer ledger (`transfers`), the
//! dispatch outbox (`transfer_outbox`) and per-category advisory locks.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use uuid::Uuid;

mod adapters;
mod transfers;

pub use adapters::{OutboxDispatchSink, PgCategoryLock, PgCheckpointStore};
pub use transfers::{
    fetch_transfer, mark_transfer_dispatched, mark_transfer_retriable,
    transfer_counts, PgTransferLedger,
};

pub const ENV_DB_URL: &str = "PSC_DATABASE_URL";

/// Connect to Postgres using PSC_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Connectivity + schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_transfers_table: table_exists(pool, "transfers").await?,
        has_outbox_table: table_exists(pool, "transfer_outbox").await?,
        has_config_table: table_exists(pool, "connector_config").await?,
    })
}

async fn table_exists(pool: &PgPool, table: &str) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name=$1
        )
        "#,
    )
    .bind(table)
    .fetch_one(pool)
    .await
    .with_context(|| format!("status table-exists query failed: {table}"))?;
    Ok(exists)
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_transfers_table: bool,
    pub has_outbox_table: bool,
    pub has_config_table: bool,
}

impl DbStatus {
    pub fn is_migrated(&self) -> bool {
        self.has_transfers_table && self.has_outbox_table && self.has_config_table
    }
}

// ---------------------------------------------------------------------------
// connector_config (key/value)
// ---------------------------------------------------------------------------

pub async fn config_get(pool: &PgPool, key: &str) -> Result<Option<String>> {
    let row = sqlx::query("select value from connector_config where key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("config_get failed: {key}"))?;

    row.map(|r| r.try_get::<String, _>("value"))
        .transpose()
        .context("config_get decode failed")
}

/// Upsert.
pub async fn config_set(pool: &PgPool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        insert into connector_config (key, value, updated_at_utc)
        values ($1, $2, now())
        on conflict (key) do update
          set value = excluded.value,
              updated_at_utc = now()
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await
    .with_context(|| format!("config_set failed: {key}"))?;
    Ok(())
}

/// Returns true if a row was deleted.
pub async fn config_delete(pool: &PgPool, key: &str) -> Result<bool> {
    let res = sqlx::query("delete from connector_config where key = $1")
        .bind(key)
        .execute(pool)
        .await
        .with_context(|| format!("config_delete failed: {key}"))?;
    Ok(res.rows_affected() > 0)
}

// ---------------------------------------------------------------------------
// transfer_outbox
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewOutboxMessage {
    pub idempotency_key: String,
    pub transfer_id: Uuid,
    pub category: String,
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub outbox_id: i64,
    pub idempotency_key: String,
    pub transfer_id: Uuid,
    pub category: String,
    pub payload: Value,
    pub status: String,
    pub created_at_utc: DateTime<Utc>,
    pub sent_at_utc: Option<DateTime<Utc>>,
}

/// Insert one outbox row. Returns false when the idempotency key already
/// exists (the insert is a no-op).
pub async fn outbox_enqueue(pool: &PgPool, msg: &NewOutboxMessage) -> Result<bool> {
    let res = sqlx::query(
        r#"
        insert into transfer_outbox (idempotency_key, transfer_id, category, payload)
        values ($1, $2, $3, $4)
        on conflict (idempotency_key) do nothing
        "#,
    )
    .bind(&msg.idempotency_key)
    .bind(msg.transfer_id)
    .bind(&msg.category)
    .bind(&msg.payload)
    .execute(pool)
    .await
    .context("outbox_enqueue failed")?;

    Ok(res.rows_affected() == 1)
}

pub async fn outbox_fetch_by_idempotency_key(
    pool: &PgPool,
    idempotency_key: &str,
) -> Result<Option<OutboxRow>> {
    let row = sqlx::query(
        r#"
        select outbox_id, idempotency_key, transfer_id, category, payload,
               status, created_at_utc, sent_at_utc
        from transfer_outbox
        where idempotency_key = $1
        "#,
    )
    .bind(idempotency_key)
    .fetch_optional(pool)
    .await
    .context("outbox_fetch_by_idempotency_key failed")?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(OutboxRow {
        outbox_id: row.try_get("outbox_id")?,
        idempotency_key: row.try_get("idempotency_key")?,
        transfer_id: row.try_get("transfer_id")?,
        category: row.try_get("category")?,
        payload: row.try_get("payload")?,
        status: row.try_get("status")?,
        created_at_utc: row.try_get("created_at_utc")?,
        sent_at_utc: row.try_get("sent_at_utc")?,
    }))
}

pub async fn outbox_count_pending(pool: &PgPool) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(
        "select count(*)::bigint from transfer_outbox where status = 'PENDING'",
    )
    .fetch_one(pool)
    .await
    .context("outbox_count_pending failed")?;
    Ok(n)
}
