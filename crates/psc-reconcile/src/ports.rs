//! Collaborator boundaries of the reconciliation engine.
//!
//! The engine owns no state. Everything it reads or writes goes through one
//! of the traits below; concrete implementations live in `psc-marketplace`
//! (orders over HTTP), `psc-db` (checkpoints, ledger, outbox, locks) and
//! `psc-testkit` (in-memory).
//!
//! All traits are object-safe and `Send + Sync` so the engine can hold
//! `&dyn Trait` references across `.await` points.

use std::collections::BTreeMap;

use anyhow::Result;
use psc_schemas::{Checkpoint, Order, OrderCategory, ProcessTransferMessage, TransferRecord};
use uuid::Uuid;

/// Read-only, paginated access to marketplace orders.
///
/// # Ordering contract
/// `list_orders` and `list_orders_since` return orders sorted by
/// `created_at_utc` ascending. The engine derives the next checkpoint from
/// the **last** element and does not re-sort.
#[async_trait::async_trait]
pub trait OrderSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Every order of `category`, oldest first.
    async fn list_orders(&self, category: OrderCategory) -> Result<Vec<Order>>;

    /// Orders of `category` created at or after `since` (inclusive), oldest first.
    async fn list_orders_since(
        &self,
        category: OrderCategory,
        since: &Checkpoint,
    ) -> Result<Vec<Order>>;

    /// Orders by identifier. Identifiers unknown upstream are omitted from the map.
    async fn list_orders_by_id(
        &self,
        category: OrderCategory,
        order_ids: &[String],
    ) -> Result<BTreeMap<String, Order>>;
}

/// Persistent per-category checkpoint storage.
///
/// Values are stored raw; parsing is the engine's job so a malformed value is
/// reported as a configuration error before anything is written.
#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, category: OrderCategory) -> Result<Option<String>>;

    async fn set(&self, category: OrderCategory, checkpoint: &Checkpoint) -> Result<()>;
}

/// Per-order transfer computation state.
#[async_trait::async_trait]
pub trait TransferLedger: Send + Sync {
    /// Transfers currently in the backlog, keyed by source order id.
    async fn retriable_transfers(
        &self,
        category: OrderCategory,
    ) -> Result<BTreeMap<String, TransferRecord>>;

    /// Re-evaluate a backlog chunk against freshly fetched orders.
    ///
    /// `orders` may be missing entries from `chunk`; implementations must
    /// absorb that partial result instead of failing the chunk.
    async fn refresh_transfers(
        &self,
        chunk: &BTreeMap<String, TransferRecord>,
        orders: &BTreeMap<String, Order>,
    ) -> Result<Vec<TransferRecord>>;

    /// Compute (or look up) the transfer for every newly observed order.
    async fn transfers_from_orders(&self, orders: &[Order]) -> Result<Vec<TransferRecord>>;

    /// `Pending -> Dispatched`. Other states are left untouched.
    async fn mark_dispatched(&self, transfer_id: Uuid) -> Result<()>;

    /// Send a transfer back to the backlog and bump its retry count.
    async fn mark_retriable(&self, transfer_id: Uuid, reason: &str) -> Result<()>;
}

/// Outbound, at-least-once transport for dispatch events.
#[async_trait::async_trait]
pub trait DispatchSink: Send + Sync {
    async fn emit(&self, message: &ProcessTransferMessage) -> Result<()>;
}

/// At-most-one concurrent run per category.
#[async_trait::async_trait]
pub trait CategoryLock: Send + Sync {
    /// `Ok(false)` when another run already holds the category.
    async fn try_acquire(&self, category: OrderCategory) -> Result<bool>;

    async fn release(&self, category: OrderCategory) -> Result<()>;
}
