//! Transfer eligibility policy.
//!
//! Every ledger implementation applies the same rules so the engine sees
//! identical dedup behaviour whether the ledger is Postgres or in-memory.
//!
//! Deterministic, pure logic. No IO.

use chrono::{DateTime, Utc};
use psc_schemas::{Order, TransferRecord, TransferStatus};

pub const REASON_ORDER_NOT_PAYABLE: &str = "order not payable";
pub const REASON_ORDER_AWAITING_PAYMENT: &str = "order awaiting payment";
pub const REASON_ORDER_NOT_FOUND: &str = "order not found upstream";

/// What a ledger must do with one newly observed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderDecision {
    /// No transfer exists yet: persist this new record.
    Create(TransferRecord),
    /// Existing record changes status: persist the update.
    Update(TransferRecord),
    /// Existing record is returned as-is.
    Keep(TransferRecord),
}

impl OrderDecision {
    pub fn record(&self) -> &TransferRecord {
        match self {
            OrderDecision::Create(r) | OrderDecision::Update(r) | OrderDecision::Keep(r) => r,
        }
    }
}

/// Payable orders are eligible. Refused and canceled orders are blocked for
/// good. Anything else is held and re-checked through the backlog.
fn status_for(order: &Order) -> (TransferStatus, Option<String>) {
    if order.state.is_payable() {
        (TransferStatus::Pending, None)
    } else if order.state.is_terminal() {
        (
            TransferStatus::Blocked,
            Some(REASON_ORDER_NOT_PAYABLE.to_string()),
        )
    } else {
        (
            TransferStatus::OnHold,
            Some(REASON_ORDER_AWAITING_PAYMENT.to_string()),
        )
    }
}

/// Decide the transfer for a freshly polled order.
///
/// The poll window is inclusive at the checkpoint, so the boundary order is
/// seen twice. Dedup happens here:
/// - `Pending` is kept and stays eligible (it was never confirmed dispatched).
/// - `Dispatched` / `Retriable` are kept and are not eligible; retriable
///   transfers come back only through the backlog.
/// - `OnHold` / `Blocked` are re-evaluated against the refreshed order.
pub fn decide_for_order(
    existing: Option<&TransferRecord>,
    order: &Order,
    now: DateTime<Utc>,
) -> OrderDecision {
    let (status, reason) = status_for(order);

    let Some(existing) = existing else {
        let mut rec = TransferRecord::for_order(order, status, now);
        rec.status_reason = reason;
        return OrderDecision::Create(rec);
    };

    match existing.status {
        TransferStatus::OnHold | TransferStatus::Blocked if status != existing.status => {
            let mut rec = existing.clone();
            rec.status = status;
            rec.status_reason = reason;
            rec.updated_at_utc = now;
            OrderDecision::Update(rec)
        }
        _ => OrderDecision::Keep(existing.clone()),
    }
}

/// Re-evaluate one backlog entry against the refreshed order, if any.
///
/// A missing order leaves a held record on hold and anything else retriable;
/// neither is eligible.
pub fn decide_for_backlog(
    record: &TransferRecord,
    order: Option<&Order>,
    now: DateTime<Utc>,
) -> TransferRecord {
    let mut rec = record.clone();
    rec.updated_at_utc = now;
    match order {
        Some(order) => {
            let (status, reason) = status_for(order);
            rec.status = status;
            rec.status_reason = reason;
        }
        None => {
            if rec.status != TransferStatus::OnHold {
                rec.status = TransferStatus::Retriable;
            }
            rec.status_reason = Some(REASON_ORDER_NOT_FOUND.to_string());
        }
    }
    rec
}

/// Backlog membership: parked transfers, transfers waiting for their order
/// to become payable, and transfers re-queued from the backlog whose
/// dispatch was never confirmed (`Pending` with a retry count).
pub fn is_backlog_entry(record: &TransferRecord) -> bool {
    match record.status {
        TransferStatus::Retriable | TransferStatus::OnHold => true,
        TransferStatus::Pending => record.retry_count > 0,
        TransferStatus::Blocked | TransferStatus::Dispatched => false,
    }
}
