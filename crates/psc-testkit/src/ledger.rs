use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use psc_reconcile::policy::{decide_for_backlog, decide_for_order, is_backlog_entry, OrderDecision};
use psc_reconcile::TransferLedger;
use psc_schemas::{Order, OrderCategory, TransferRecord, TransferStatus};
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    records: BTreeMap<Uuid, TransferRecord>,
    by_order: BTreeMap<(OrderCategory, String), Uuid>,
    refresh_calls: Vec<usize>,
    compute_calls: Vec<usize>,
    fail_retriable_query: bool,
    fail_mark_dispatched: bool,
    fail_mark_retriable: bool,
}

/// In-memory ledger applying the shared [`psc_reconcile::policy`] rules,
/// with call recording and failure injection.
#[derive(Default)]
pub struct MemoryLedger {
    inner: Mutex<Inner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Insert or replace a record as-is.
    pub fn seed(&self, record: TransferRecord) {
        let mut g = self.lock();
        g.by_order.insert(
            (record.category, record.order_id.clone()),
            record.transfer_id,
        );
        g.records.insert(record.transfer_id, record);
    }

    pub fn get(&self, transfer_id: Uuid) -> Option<TransferRecord> {
        self.lock().records.get(&transfer_id).cloned()
    }

    pub fn by_order(&self, category: OrderCategory, order_id: &str) -> Option<TransferRecord> {
        let g = self.lock();
        g.by_order
            .get(&(category, order_id.to_string()))
            .and_then(|id| g.records.get(id))
            .cloned()
    }

    pub fn count_with_status(&self, status: TransferStatus) -> usize {
        self.lock()
            .records
            .values()
            .filter(|r| r.status == status)
            .count()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Chunk sizes passed to `refresh_transfers`, in call order.
    pub fn refresh_calls(&self) -> Vec<usize> {
        self.lock().refresh_calls.clone()
    }

    /// Batch sizes passed to `transfers_from_orders`, in call order.
    pub fn compute_calls(&self) -> Vec<usize> {
        self.lock().compute_calls.clone()
    }

    pub fn fail_retriable_query(&self, fail: bool) {
        self.lock().fail_retriable_query = fail;
    }

    pub fn fail_mark_dispatched(&self, fail: bool) {
        self.lock().fail_mark_dispatched = fail;
    }

    pub fn fail_mark_retriable(&self, fail: bool) {
        self.lock().fail_mark_retriable = fail;
    }

    fn store(g: &mut Inner, record: TransferRecord) {
        g.by_order.insert(
            (record.category, record.order_id.clone()),
            record.transfer_id,
        );
        g.records.insert(record.transfer_id, record);
    }
}

#[async_trait::async_trait]
impl TransferLedger for MemoryLedger {
    async fn retriable_transfers(
        &self,
        category: OrderCategory,
    ) -> Result<BTreeMap<String, TransferRecord>> {
        let g = self.lock();
        if g.fail_retriable_query {
            bail!("ledger unavailable");
        }
        Ok(g.records
            .values()
            .filter(|r| r.category == category && is_backlog_entry(r))
            .map(|r| (r.order_id.clone(), r.clone()))
            .collect())
    }

    async fn refresh_transfers(
        &self,
        chunk: &BTreeMap<String, TransferRecord>,
        orders: &BTreeMap<String, Order>,
    ) -> Result<Vec<TransferRecord>> {
        let now = Utc::now();
        let mut g = self.lock();
        g.refresh_calls.push(chunk.len());

        let mut out = Vec::with_capacity(chunk.len());
        for (order_id, rec) in chunk {
            let current = g.records.get(&rec.transfer_id).cloned().unwrap_or_else(|| rec.clone());
            let updated = decide_for_backlog(&current, orders.get(order_id), now);
            Self::store(&mut g, updated.clone());
            out.push(updated);
        }
        Ok(out)
    }

    async fn transfers_from_orders(&self, orders: &[Order]) -> Result<Vec<TransferRecord>> {
        let now = Utc::now();
        let mut g = self.lock();
        g.compute_calls.push(orders.len());

        let mut out = Vec::with_capacity(orders.len());
        for order in orders {
            let existing = g
                .by_order
                .get(&(order.category, order.order_id.clone()))
                .and_then(|id| g.records.get(id))
                .cloned();
            match decide_for_order(existing.as_ref(), order, now) {
                OrderDecision::Create(r) | OrderDecision::Update(r) => {
                    Self::store(&mut g, r.clone());
                    out.push(r);
                }
                OrderDecision::Keep(r) => out.push(r),
            }
        }
        Ok(out)
    }

    async fn mark_dispatched(&self, transfer_id: Uuid) -> Result<()> {
        let mut g = self.lock();
        if g.fail_mark_dispatched {
            bail!("ledger write failed");
        }
        let rec = g
            .records
            .get_mut(&transfer_id)
            .ok_or_else(|| anyhow!("unknown transfer {}", transfer_id))?;
        if rec.status == TransferStatus::Pending {
            rec.status = TransferStatus::Dispatched;
            rec.status_reason = None;
            rec.updated_at_utc = Utc::now();
        }
        Ok(())
    }

    async fn mark_retriable(&self, transfer_id: Uuid, reason: &str) -> Result<()> {
        let mut g = self.lock();
        if g.fail_mark_retriable {
            bail!("ledger write failed");
        }
        let rec = g
            .records
            .get_mut(&transfer_id)
            .ok_or_else(|| anyhow!("unknown transfer {}", transfer_id))?;
        if matches!(rec.status, TransferStatus::Pending | TransferStatus::Dispatched) {
            rec.status = TransferStatus::Retriable;
            rec.status_reason = Some(reason.to_string());
            rec.retry_count += 1;
            rec.updated_at_utc = Utc::now();
        }
        Ok(())
    }
}
