//! psc-reconcile
//!
//! Order → transfer reconciliation and dispatch.
//!
//! Per order category, a run:
//! 1. replays the retriable backlog in bounded chunks (orders re-fetched by id,
//!    transfers refreshed, eligible ones dispatched);
//! 2. polls orders created since the stored checkpoint (inclusive), computes
//!    their transfers, dispatches the eligible ones;
//! 3. advances the checkpoint to the newest polled order, after dispatch.
//!
//! Delivery is at-least-once. Duplicate suppression across runs is the
//! ledger's job (see [`policy`]); within one engine value a transfer is
//! emitted at most once.
//!
//! The engine holds no state of its own. Collaborators are injected through
//! the traits in [`ports`].

mod engine;
mod error;
pub mod policy;
pub mod ports;
mod types;
pub mod window;

pub use engine::ReconciliationEngine;
pub use error::CategoryError;
pub use ports::{CategoryLock, CheckpointStore, DispatchSink, OrderSource, TransferLedger};
pub use types::*;
pub use window::{chunk_backlog, next_checkpoint};
