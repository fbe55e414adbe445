use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result};
use psc_reconcile::{CategoryLock, CheckpointStore, DispatchSink};
use psc_schemas::{Checkpoint, OrderCategory, ProcessTransferMessage};
use sqlx::{PgConnection, PgPool};
use tracing::debug;

use crate::{config_get, config_set, outbox_enqueue, NewOutboxMessage};

/// Checkpoints live in `connector_config` under the category's key.
#[derive(Clone)]
pub struct PgCheckpointStore {
    pool: PgPool,
}

impl PgCheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CheckpointStore for PgCheckpointStore {
    async fn get(&self, category: OrderCategory) -> Result<Option<String>> {
        config_get(&self.pool, category.checkpoint_key()).await
    }

    async fn set(&self, category: OrderCategory, checkpoint: &Checkpoint) -> Result<()> {
        config_set(&self.pool, category.checkpoint_key(), &checkpoint.to_rfc3339()).await
    }
}

/// Emits by enqueuing into `transfer_outbox`. Re-emitting the same
/// (transfer, attempt) is a no-op.
#[derive(Clone)]
pub struct OutboxDispatchSink {
    pool: PgPool,
}

impl OutboxDispatchSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DispatchSink for OutboxDispatchSink {
    async fn emit(&self, message: &ProcessTransferMessage) -> Result<()> {
        let payload =
            serde_json::to_value(message).context("serialize process transfer message failed")?;
        let key = message.idempotency_key();
        let created = outbox_enqueue(
            &self.pool,
            &NewOutboxMessage {
                idempotency_key: key.clone(),
                transfer_id: message.transfer_id,
                category: message.category.as_str().to_string(),
                payload,
            },
        )
        .await?;

        if !created {
            debug!(idempotency_key = %key, "outbox row already present");
        }
        Ok(())
    }
}

/// Advisory-lock namespace; low bits select the category.
const LOCK_NAMESPACE: i64 = 0x5053_4300;

fn advisory_key(category: OrderCategory) -> i64 {
    match category {
        OrderCategory::Product => LOCK_NAMESPACE + 1,
        OrderCategory::Service => LOCK_NAMESPACE + 2,
    }
}

/// Session advisory lock per category.
///
/// Session locks belong to a connection, so each held lock owns a connection
/// detached from the pool. Dropping it (process exit included) releases the
/// lock server-side.
pub struct PgCategoryLock {
    pool: PgPool,
    held: Mutex<HashMap<OrderCategory, PgConnection>>,
}

impl PgCategoryLock {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            held: Mutex::new(HashMap::new()),
        }
    }

    fn held(&self) -> std::sync::MutexGuard<'_, HashMap<OrderCategory, PgConnection>> {
        self.held.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait::async_trait]
impl CategoryLock for PgCategoryLock {
    async fn try_acquire(&self, category: OrderCategory) -> Result<bool> {
        if self.held().contains_key(&category) {
            return Ok(false);
        }

        let mut conn = self
            .pool
            .acquire()
            .await
            .context("acquire lock connection failed")?
            .detach();
        let (locked,): (bool,) = sqlx::query_as::<_, (bool,)>("select pg_try_advisory_lock($1)")
            .bind(advisory_key(category))
            .fetch_one(&mut conn)
            .await
            .context("pg_try_advisory_lock failed")?;

        if locked {
            self.held().insert(category, conn);
        }
        Ok(locked)
    }

    async fn release(&self, category: OrderCategory) -> Result<()> {
        let taken = self.held().remove(&category);
        let Some(mut conn) = taken else {
            return Ok(());
        };
        sqlx::query("select pg_advisory_unlock($1)")
            .bind(advisory_key(category))
            .execute(&mut conn)
            .await
            .context("pg_advisory_unlock failed")?;
        Ok(())
    }
}
