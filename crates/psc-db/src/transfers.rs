use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use psc_reconcile::policy::{decide_for_backlog, decide_for_order, OrderDecision};
use psc_reconcile::TransferLedger;
use psc_schemas::{Order, OrderCategory, TransferRecord, TransferStatus};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use tracing::debug;
use uuid::Uuid;

const TRANSFER_COLUMNS: &str = r#"
    transfer_id, category, order_id, status, status_reason, retry_count,
    order_created_at_utc, created_at_utc, updated_at_utc
"#;

fn transfer_from_row(row: &PgRow) -> Result<TransferRecord> {
    Ok(TransferRecord {
        transfer_id: row.try_get("transfer_id")?,
        category: OrderCategory::parse(&row.try_get::<String, _>("category")?)?,
        order_id: row.try_get("order_id")?,
        status: TransferStatus::parse(&row.try_get::<String, _>("status")?)?,
        status_reason: row.try_get("status_reason")?,
        retry_count: row.try_get("retry_count")?,
        order_created_at_utc: row.try_get("order_created_at_utc")?,
        created_at_utc: row.try_get("created_at_utc")?,
        updated_at_utc: row.try_get("updated_at_utc")?,
    })
}

pub async fn fetch_transfer(pool: &PgPool, transfer_id: Uuid) -> Result<Option<TransferRecord>> {
    let sql = format!("select {TRANSFER_COLUMNS} from transfers where transfer_id = $1");
    let row = sqlx::query(&sql)
        .bind(transfer_id)
        .fetch_optional(pool)
        .await
        .context("fetch_transfer failed")?;
    row.as_ref().map(transfer_from_row).transpose()
}

async fn select_by_order(
    conn: &mut PgConnection,
    category: OrderCategory,
    order_id: &str,
    for_update: bool,
) -> Result<Option<TransferRecord>> {
    let sql = format!(
        "select {TRANSFER_COLUMNS} from transfers where category = $1 and order_id = $2{}",
        if for_update { " for update" } else { "" }
    );
    let row = sqlx::query(&sql)
        .bind(category.as_str())
        .bind(order_id)
        .fetch_optional(conn)
        .await
        .context("select transfer by order failed")?;
    row.as_ref().map(transfer_from_row).transpose()
}

async fn select_by_id_for_update(
    conn: &mut PgConnection,
    transfer_id: Uuid,
) -> Result<Option<TransferRecord>> {
    let sql = format!("select {TRANSFER_COLUMNS} from transfers where transfer_id = $1 for update");
    let row = sqlx::query(&sql)
        .bind(transfer_id)
        .fetch_optional(conn)
        .await
        .context("select transfer for update failed")?;
    row.as_ref().map(transfer_from_row).transpose()
}

/// Returns false if a row for (category, order_id) already existed.
async fn insert_transfer(conn: &mut PgConnection, rec: &TransferRecord) -> Result<bool> {
    let res = sqlx::query(
        r#"
        insert into transfers (
          transfer_id, category, order_id, status, status_reason, retry_count,
          order_created_at_utc, created_at_utc, updated_at_utc
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9
        )
        on conflict (category, order_id) do nothing
        "#,
    )
    .bind(rec.transfer_id)
    .bind(rec.category.as_str())
    .bind(&rec.order_id)
    .bind(rec.status.as_str())
    .bind(&rec.status_reason)
    .bind(rec.retry_count)
    .bind(rec.order_created_at_utc)
    .bind(rec.created_at_utc)
    .bind(rec.updated_at_utc)
    .execute(conn)
    .await
    .context("insert_transfer failed")?;
    Ok(res.rows_affected() == 1)
}

async fn update_transfer_status(conn: &mut PgConnection, rec: &TransferRecord) -> Result<()> {
    sqlx::query(
        r#"
        update transfers
        set status = $2,
            status_reason = $3,
            updated_at_utc = $4
        where transfer_id = $1
        "#,
    )
    .bind(rec.transfer_id)
    .bind(rec.status.as_str())
    .bind(&rec.status_reason)
    .bind(rec.updated_at_utc)
    .execute(conn)
    .await
    .context("update_transfer_status failed")?;
    Ok(())
}

/// PENDING -> DISPATCHED. Returns false if the transfer was in another state
/// (or does not exist).
pub async fn mark_transfer_dispatched(pool: &PgPool, transfer_id: Uuid) -> Result<bool> {
    let res = sqlx::query(
        r#"
        update transfers
        set status = 'DISPATCHED',
            status_reason = null,
            dispatched_at_utc = now(),
            updated_at_utc = now()
        where transfer_id = $1
          and status = 'PENDING'
        "#,
    )
    .bind(transfer_id)
    .execute(pool)
    .await
    .context("mark_transfer_dispatched failed")?;
    Ok(res.rows_affected() == 1)
}

/// PENDING|DISPATCHED -> RETRIABLE, retry_count + 1. Returns false if the
/// transfer was in another state (or does not exist).
pub async fn mark_transfer_retriable(pool: &PgPool, transfer_id: Uuid, reason: &str) -> Result<bool> {
    let res = sqlx::query(
        r#"
        update transfers
        set status = 'RETRIABLE',
            status_reason = $2,
            retry_count = retry_count + 1,
            updated_at_utc = now()
        where transfer_id = $1
          and status in ('PENDING','DISPATCHED')
        "#,
    )
    .bind(transfer_id)
    .bind(reason)
    .execute(pool)
    .await
    .context("mark_transfer_retriable failed")?;
    Ok(res.rows_affected() == 1)
}

/// (category, status, count) for every populated bucket, sorted.
pub async fn transfer_counts(pool: &PgPool) -> Result<Vec<(String, String, i64)>> {
    let rows = sqlx::query_as::<_, (String, String, i64)>(
        r#"
        select category, status, count(*)::bigint
        from transfers
        group by category, status
        order by category, status
        "#,
    )
    .fetch_all(pool)
    .await
    .context("transfer_counts failed")?;
    Ok(rows)
}

/// Postgres-backed [`TransferLedger`] applying the shared policy inside one
/// transaction per call.
#[derive(Clone)]
pub struct PgTransferLedger {
    pool: PgPool,
}

impl PgTransferLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_exists(&self, transfer_id: Uuid) -> Result<()> {
        match fetch_transfer(&self.pool, transfer_id).await? {
            Some(_) => Ok(()),
            None => Err(anyhow!("unknown transfer {}", transfer_id)),
        }
    }
}

#[async_trait::async_trait]
impl TransferLedger for PgTransferLedger {
    async fn retriable_transfers(
        &self,
        category: OrderCategory,
    ) -> Result<BTreeMap<String, TransferRecord>> {
        let sql = format!(
            r#"
            select {TRANSFER_COLUMNS}
            from transfers
            where category = $1
              and (status in ('RETRIABLE','ON_HOLD') or (status = 'PENDING' and retry_count > 0))
            order by order_id
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(category.as_str())
            .fetch_all(&self.pool)
            .await
            .context("retriable_transfers failed")?;

        let mut out = BTreeMap::new();
        for row in &rows {
            let rec = transfer_from_row(row)?;
            out.insert(rec.order_id.clone(), rec);
        }
        Ok(out)
    }

    async fn refresh_transfers(
        &self,
        chunk: &BTreeMap<String, TransferRecord>,
        orders: &BTreeMap<String, Order>,
    ) -> Result<Vec<TransferRecord>> {
        let now: DateTime<Utc> = Utc::now();
        let mut tx = self.pool.begin().await.context("refresh_transfers begin failed")?;

        let mut out = Vec::with_capacity(chunk.len());
        for (order_id, rec) in chunk {
            let current = select_by_id_for_update(&mut tx, rec.transfer_id)
                .await?
                .unwrap_or_else(|| rec.clone());
            let updated = decide_for_backlog(&current, orders.get(order_id), now);
            update_transfer_status(&mut tx, &updated).await?;
            out.push(updated);
        }

        tx.commit().await.context("refresh_transfers commit failed")?;
        Ok(out)
    }

    async fn transfers_from_orders(&self, orders: &[Order]) -> Result<Vec<TransferRecord>> {
        let now: DateTime<Utc> = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("transfers_from_orders begin failed")?;

        let mut out = Vec::with_capacity(orders.len());
        for order in orders {
            let existing = select_by_order(&mut tx, order.category, &order.order_id, true).await?;
            match decide_for_order(existing.as_ref(), order, now) {
                OrderDecision::Create(rec) => {
                    if insert_transfer(&mut tx, &rec).await? {
                        out.push(rec);
                    } else {
                        // lost an insert race: use the winner's row
                        let winner =
                            select_by_order(&mut tx, order.category, &order.order_id, true)
                                .await?
                                .ok_or_else(|| {
                                    anyhow!("transfer for order {} vanished", order.order_id)
                                })?;
                        debug!(order_id = %order.order_id, "transfer created concurrently");
                        out.push(winner);
                    }
                }
                OrderDecision::Update(rec) => {
                    update_transfer_status(&mut tx, &rec).await?;
                    out.push(rec);
                }
                OrderDecision::Keep(rec) => out.push(rec),
            }
        }

        tx.commit()
            .await
            .context("transfers_from_orders commit failed")?;
        Ok(out)
    }

    async fn mark_dispatched(&self, transfer_id: Uuid) -> Result<()> {
        if !mark_transfer_dispatched(&self.pool, transfer_id).await? {
            self.ensure_exists(transfer_id).await?;
        }
        Ok(())
    }

    async fn mark_retriable(&self, transfer_id: Uuid, reason: &str) -> Result<()> {
        if !mark_transfer_retriable(&self.pool, transfer_id, reason).await? {
            self.ensure_exists(transfer_id).await?;
        }
        Ok(())
    }
}
