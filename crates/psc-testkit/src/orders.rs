use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use psc_reconcile::OrderSource;
use psc_schemas::{Checkpoint, Order, OrderCategory};

/// One recorded call against [`FakeOrderSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCall {
    List(OrderCategory),
    ListSince(OrderCategory, Checkpoint),
    ListById(OrderCategory, Vec<String>),
}

#[derive(Default)]
struct Inner {
    orders: BTreeMap<OrderCategory, Vec<Order>>,
    calls: Vec<SourceCall>,
    failure: Option<String>,
}

/// In-memory marketplace. Listings are returned oldest first, honouring the
/// [`OrderSource`] ordering contract.
#[derive(Default)]
pub struct FakeOrderSource {
    inner: Mutex<Inner>,
}

impl FakeOrderSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let src = Self::new();
        for o in orders {
            src.push_order(o);
        }
        src
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn push_order(&self, order: Order) {
        let mut g = self.lock();
        let list = g.orders.entry(order.category).or_default();
        list.push(order);
        // stable: equal timestamps keep insertion order
        list.sort_by_key(|o| o.created_at_utc);
    }

    /// Simulate an order deleted or expired upstream.
    pub fn remove_order(&self, category: OrderCategory, order_id: &str) {
        let mut g = self.lock();
        if let Some(list) = g.orders.get_mut(&category) {
            list.retain(|o| o.order_id != order_id);
        }
    }

    /// Every subsequent call fails with `message` until [`Self::heal`].
    pub fn fail_with(&self, message: &str) {
        self.lock().failure = Some(message.to_string());
    }

    pub fn heal(&self) {
        self.lock().failure = None;
    }

    pub fn calls(&self) -> Vec<SourceCall> {
        self.lock().calls.clone()
    }

    /// Sizes of the id-lookup requests, in call order.
    pub fn by_id_request_sizes(&self) -> Vec<usize> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                SourceCall::ListById(_, ids) => Some(ids.len()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: SourceCall) -> Result<()> {
        let mut g = self.lock();
        g.calls.push(call);
        match &g.failure {
            Some(msg) => Err(anyhow!("{}", msg)),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl OrderSource for FakeOrderSource {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn list_orders(&self, category: OrderCategory) -> Result<Vec<Order>> {
        self.record(SourceCall::List(category))?;
        Ok(self.lock().orders.get(&category).cloned().unwrap_or_default())
    }

    async fn list_orders_since(
        &self,
        category: OrderCategory,
        since: &Checkpoint,
    ) -> Result<Vec<Order>> {
        self.record(SourceCall::ListSince(category, *since))?;
        Ok(self
            .lock()
            .orders
            .get(&category)
            .map(|list| {
                list.iter()
                    .filter(|o| o.created_at_utc >= since.timestamp())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_orders_by_id(
        &self,
        category: OrderCategory,
        order_ids: &[String],
    ) -> Result<BTreeMap<String, Order>> {
        self.record(SourceCall::ListById(category, order_ids.to_vec()))?;
        let g = self.lock();
        let Some(list) = g.orders.get(&category) else {
            return Ok(BTreeMap::new());
        };
        Ok(list
            .iter()
            .filter(|o| order_ids.contains(&o.order_id))
            .map(|o| (o.order_id.clone(), o.clone()))
            .collect())
    }
}
