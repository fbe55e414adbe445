//! psc-schemas
//!
//! Shared data model for the payment split connector: order categories,
//! marketplace orders, transfer records, checkpoints and the dispatch message.
//!
//! Pure types. No IO.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Order category
// ---------------------------------------------------------------------------

/// Marketplace sub-domain an order belongs to.
///
/// The category selects the marketplace endpoints, the checkpoint key and the
/// ledger partition. It is fixed for the duration of one category run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderCategory {
    Product,
    Service,
}

impl OrderCategory {
    pub const ALL: [OrderCategory; 2] = [OrderCategory::Product, OrderCategory::Service];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderCategory::Product => "PRODUCT",
            OrderCategory::Service => "SERVICE",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PRODUCT" => Ok(OrderCategory::Product),
            "SERVICE" => Ok(OrderCategory::Service),
            other => Err(anyhow!(
                "invalid order category '{}'. expected one of: PRODUCT | SERVICE",
                other
            )),
        }
    }

    /// Key under which this category's checkpoint is persisted.
    pub fn checkpoint_key(&self) -> &'static str {
        match self {
            OrderCategory::Product => "product_payment_split_checkpoint",
            OrderCategory::Service => "service_payment_split_checkpoint",
        }
    }
}

impl fmt::Display for OrderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Normalized marketplace order state.
///
/// Product and service orders use different vocabularies upstream; both are
/// folded into this enum by the marketplace adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    AwaitingAcceptance,
    AwaitingDebit,
    Accepted,
    Shipped,
    Received,
    Closed,
    Refused,
    Canceled,
    Other(String),
}

impl OrderState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "STAGING" | "WAITING_ACCEPTANCE" | "WAITING_SCORING" => OrderState::AwaitingAcceptance,
            "WAITING_DEBIT" | "WAITING_DEBIT_PAYMENT" => OrderState::AwaitingDebit,
            "SHIPPING" | "ORDER_ACCEPTED" | "ORDER_PENDING" => OrderState::Accepted,
            "SHIPPED" | "TO_COLLECT" => OrderState::Shipped,
            "RECEIVED" => OrderState::Received,
            "CLOSED" | "ORDER_CLOSED" => OrderState::Closed,
            "REFUSED" | "ORDER_REFUSED" | "ORDER_EXPIRED" => OrderState::Refused,
            "CANCELED" | "CANCELLED" | "ORDER_CANCELLED" => OrderState::Canceled,
            _ => OrderState::Other(raw.trim().to_string()),
        }
    }

    /// `true` once the customer has been debited and the order was not
    /// refused or canceled. Unknown states are never payable.
    pub fn is_payable(&self) -> bool {
        matches!(
            self,
            OrderState::Accepted | OrderState::Shipped | OrderState::Received | OrderState::Closed
        )
    }

    /// Refused and canceled orders never become payable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Refused | OrderState::Canceled)
    }
}

/// A marketplace order as observed by the connector. Read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub category: OrderCategory,
    pub created_at_utc: DateTime<Utc>,
    pub state: OrderState,
}

impl Order {
    pub fn new(
        order_id: impl Into<String>,
        category: OrderCategory,
        created_at_utc: DateTime<Utc>,
        state: OrderState,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            category,
            created_at_utc,
            state,
        }
    }
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

/// Lifecycle of a transfer record.
///
/// ```text
/// (new) ──► Pending ──► Dispatched ──► Retriable ──► Pending ...
///    ├────► OnHold ──► Pending (order became payable, via the backlog)
///    └────► Blocked (order refused or canceled)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferStatus {
    /// Computed and eligible for dispatch.
    Pending,
    /// Order not payable yet; re-checked with the backlog on every run.
    OnHold,
    /// Order refused or canceled. Terminal unless a re-poll sees it payable.
    Blocked,
    /// Handed to the dispatch sink.
    Dispatched,
    /// Downstream processing failed; waits in the backlog.
    Retriable,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::OnHold => "ON_HOLD",
            TransferStatus::Blocked => "BLOCKED",
            TransferStatus::Dispatched => "DISPATCHED",
            TransferStatus::Retriable => "RETRIABLE",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(TransferStatus::Pending),
            "ON_HOLD" => Ok(TransferStatus::OnHold),
            "BLOCKED" => Ok(TransferStatus::Blocked),
            "DISPATCHED" => Ok(TransferStatus::Dispatched),
            "RETRIABLE" => Ok(TransferStatus::Retriable),
            other => Err(anyhow!("invalid transfer status: {}", other)),
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub transfer_id: Uuid,
    pub order_id: String,
    pub category: OrderCategory,
    pub status: TransferStatus,
    pub status_reason: Option<String>,
    /// Number of times the transfer went back to the backlog.
    pub retry_count: i32,
    pub order_created_at_utc: DateTime<Utc>,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
}

impl TransferRecord {
    /// Fresh record for an order that has never been seen before.
    pub fn for_order(order: &Order, status: TransferStatus, now: DateTime<Utc>) -> Self {
        Self {
            transfer_id: Uuid::new_v4(),
            order_id: order.order_id.clone(),
            category: order.category,
            status,
            status_reason: None,
            retry_count: 0,
            order_created_at_utc: order.created_at_utc,
            created_at_utc: now,
            updated_at_utc: now,
        }
    }

    pub fn is_dispatchable(&self) -> bool {
        self.status == TransferStatus::Pending
    }
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Lower bound (inclusive) for the next incremental order poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Checkpoint(DateTime<Utc>);

impl Checkpoint {
    pub fn new(ts: DateTime<Utc>) -> Self {
        Self(ts)
    }

    /// Parse a persisted checkpoint value (RFC 3339).
    pub fn parse(raw: &str) -> Result<Self> {
        let dt = DateTime::parse_from_rfc3339(raw.trim())
            .with_context(|| format!("checkpoint is not an RFC 3339 timestamp: '{}'", raw))?;
        Ok(Self(dt.with_timezone(&Utc)))
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }

    /// Canonical persisted form. Round-trips through [`Checkpoint::parse`].
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Checkpoint {
    fn from(ts: DateTime<Utc>) -> Self {
        Self(ts)
    }
}

// ---------------------------------------------------------------------------
// Dispatch message
// ---------------------------------------------------------------------------

/// Event handed to the downstream transfer processor, one per eligible transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessTransferMessage {
    pub transfer_id: Uuid,
    pub category: OrderCategory,
    /// Equals the transfer's `retry_count` at emission time.
    pub attempt: i32,
    pub emitted_at_utc: DateTime<Utc>,
}

impl ProcessTransferMessage {
    pub fn for_transfer(t: &TransferRecord, now: DateTime<Utc>) -> Self {
        Self {
            transfer_id: t.transfer_id,
            category: t.category,
            attempt: t.retry_count,
            emitted_at_utc: now,
        }
    }

    /// Stable per (transfer, attempt): re-emitting the same attempt is a duplicate.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.transfer_id, self.attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn category_parse_is_case_insensitive() {
        assert_eq!(OrderCategory::parse("product").unwrap(), OrderCategory::Product);
        assert_eq!(OrderCategory::parse(" SERVICE ").unwrap(), OrderCategory::Service);
        assert!(OrderCategory::parse("bundle").is_err());
    }

    #[test]
    fn checkpoint_keys_are_distinct_per_category() {
        assert_ne!(
            OrderCategory::Product.checkpoint_key(),
            OrderCategory::Service.checkpoint_key()
        );
    }

    #[test]
    fn checkpoint_round_trips_through_persisted_form() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        let cp = Checkpoint::new(ts);
        assert_eq!(cp.to_rfc3339(), "2024-03-01T12:30:05Z");
        assert_eq!(Checkpoint::parse(&cp.to_rfc3339()).unwrap(), cp);
    }

    #[test]
    fn checkpoint_accepts_offsets_and_normalizes_to_utc() {
        let cp = Checkpoint::parse("2024-03-01T14:30:05+02:00").unwrap();
        assert_eq!(cp.to_rfc3339(), "2024-03-01T12:30:05Z");
    }

    #[test]
    fn malformed_checkpoint_is_rejected() {
        assert!(Checkpoint::parse("yesterday").is_err());
        assert!(Checkpoint::parse("").is_err());
    }

    #[test]
    fn refused_and_unknown_states_are_not_payable() {
        assert!(OrderState::parse("SHIPPED").is_payable());
        assert!(OrderState::parse("ORDER_ACCEPTED").is_payable());
        assert!(!OrderState::parse("REFUSED").is_payable());
        assert!(!OrderState::parse("WAITING_DEBIT").is_payable());
        assert_eq!(
            OrderState::parse("SOMETHING_NEW"),
            OrderState::Other("SOMETHING_NEW".to_string())
        );
        assert!(!OrderState::parse("SOMETHING_NEW").is_payable());
    }

    #[test]
    fn only_refused_and_canceled_are_terminal() {
        assert!(OrderState::parse("ORDER_REFUSED").is_terminal());
        assert!(OrderState::parse("CANCELLED").is_terminal());
        assert!(!OrderState::parse("WAITING_DEBIT").is_terminal());
        assert!(!OrderState::parse("STAGING").is_terminal());
        assert!(!OrderState::parse("SOMETHING_NEW").is_terminal());
    }

    #[test]
    fn on_hold_status_round_trips() {
        assert_eq!(TransferStatus::OnHold.as_str(), "ON_HOLD");
        assert_eq!(TransferStatus::parse("ON_HOLD").unwrap(), TransferStatus::OnHold);
    }

    #[test]
    fn idempotency_key_changes_with_attempt() {
        let order = Order::new(
            "O-1",
            OrderCategory::Product,
            Utc.timestamp_opt(100, 0).unwrap(),
            OrderState::Shipped,
        );
        let mut t = TransferRecord::for_order(&order, TransferStatus::Pending, Utc::now());
        let first = ProcessTransferMessage::for_transfer(&t, Utc::now());
        t.retry_count += 1;
        let second = ProcessTransferMessage::for_transfer(&t, Utc::now());
        assert_ne!(first.idempotency_key(), second.idempotency_key());
    }

    #[test]
    fn message_serializes_category_as_upper_case() {
        let order = Order::new(
            "S-9",
            OrderCategory::Service,
            Utc.timestamp_opt(100, 0).unwrap(),
            OrderState::Accepted,
        );
        let t = TransferRecord::for_order(&order, TransferStatus::Pending, Utc::now());
        let msg = ProcessTransferMessage::for_transfer(&t, Utc::now());
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["category"], "SERVICE");
    }
}
