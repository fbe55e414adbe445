//! psc-testkit
//!
//! In-memory collaborators for driving `psc_reconcile::ReconciliationEngine`
//! without a marketplace, a database or a transport. Each fake records the
//! calls it receives and supports failure injection.
//!
//! Used ONLY by tests.

mod ledger;
mod logs;
mod orders;
mod sink;
mod store;

pub use ledger::MemoryLedger;
pub use logs::LogCapture;
pub use orders::{FakeOrderSource, SourceCall};
pub use sink::RecordingSink;
pub use store::{MemoryCategoryLock, MemoryCheckpointStore};

use chrono::{DateTime, TimeZone, Utc};
use psc_schemas::{Order, OrderCategory, OrderState, TransferRecord, TransferStatus};

/// Epoch seconds → UTC timestamp.
pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// A shipped (payable) order created at `secs`.
pub fn payable_order(category: OrderCategory, order_id: &str, secs: i64) -> Order {
    Order::new(order_id, category, ts(secs), OrderState::Shipped)
}

/// A refused (non-payable) order created at `secs`.
pub fn refused_order(category: OrderCategory, order_id: &str, secs: i64) -> Order {
    Order::new(order_id, category, ts(secs), OrderState::Refused)
}

/// An order still waiting for the customer debit, created at `secs`.
pub fn awaiting_debit_order(category: OrderCategory, order_id: &str, secs: i64) -> Order {
    Order::new(order_id, category, ts(secs), OrderState::AwaitingDebit)
}

/// A transfer already parked in the backlog for `order`.
pub fn retriable_transfer(order: &Order, retry_count: i32) -> TransferRecord {
    let mut t = TransferRecord::for_order(order, TransferStatus::Retriable, ts(0));
    t.retry_count = retry_count;
    t.status_reason = Some("downstream processing failed".to_string());
    t
}
