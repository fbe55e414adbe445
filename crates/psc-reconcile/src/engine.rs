use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use psc_schemas::{Checkpoint, Order, OrderCategory, ProcessTransferMessage, TransferRecord};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::window::{chunk_backlog, next_checkpoint};
use crate::{
    BacklogOutcome, CategoryError, CategoryLock, CategoryReport, CategoryStatus, CategorySummary,
    CheckpointChange, CheckpointStore, DispatchSink, DispatchTally, EngineConfig, OrderSource,
    PollOutcome, RunReport, TransferLedger,
};

/// Orchestrates backlog replay and incremental polling per order category.
///
/// Holds borrowed collaborators only; every piece of state lives in the
/// checkpoint store and the ledger. One engine value corresponds to one
/// invocation: transfers emitted through it are never emitted twice by it.
pub struct ReconciliationEngine<'a> {
    orders: &'a dyn OrderSource,
    checkpoints: &'a dyn CheckpointStore,
    ledger: &'a dyn TransferLedger,
    sink: &'a dyn DispatchSink,
    lock: Option<&'a dyn CategoryLock>,
    shutdown: Option<Arc<AtomicBool>>,
    config: EngineConfig,
    emitted: Mutex<HashSet<Uuid>>,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(
        orders: &'a dyn OrderSource,
        checkpoints: &'a dyn CheckpointStore,
        ledger: &'a dyn TransferLedger,
        sink: &'a dyn DispatchSink,
    ) -> Self {
        Self {
            orders,
            checkpoints,
            ledger,
            sink,
            lock: None,
            shutdown: None,
            config: EngineConfig::default(),
            emitted: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Serialize runs of the same category across processes.
    pub fn with_lock(mut self, lock: &'a dyn CategoryLock) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Cooperative cancellation, honoured between categories and between
    /// backlog chunks.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|f| f.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Process every category in `categories` (duplicates ignored).
    ///
    /// Categories are independent: a failure in one is recorded in the
    /// report and the next category still runs.
    pub async fn run(&self, categories: &[OrderCategory]) -> RunReport {
        let mut unique: Vec<OrderCategory> = Vec::with_capacity(categories.len());
        for c in categories {
            if !unique.contains(c) {
                unique.push(*c);
            }
        }

        let mut report = RunReport::default();
        for category in unique {
            if self.shutdown_requested() {
                info!(category = %category, "shutdown requested; category not started");
                report.categories.push(CategoryReport {
                    category,
                    status: CategoryStatus::NotStarted,
                });
                continue;
            }

            let status = self.run_category(category).await;
            if let CategoryStatus::Failed(e) = &status {
                error!(
                    category = %category,
                    transient = e.is_transient(),
                    error = %e,
                    "category run failed"
                );
            }
            report.categories.push(CategoryReport { category, status });
        }

        info!(
            categories = report.categories.len(),
            success = report.is_success(),
            "reconciliation run finished"
        );
        report
    }

    /// Backlog first, then the incremental poll, under the category lock
    /// when one is configured.
    pub async fn run_category(&self, category: OrderCategory) -> CategoryStatus {
        if let Some(lock) = self.lock {
            match lock.try_acquire(category).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(category = %category, "category run already in progress; skipping");
                    return CategoryStatus::SkippedLocked;
                }
                Err(e) => return CategoryStatus::Failed(CategoryError::Lock(e)),
            }
        }

        let result = self.backlog_then_poll(category).await;

        if let Some(lock) = self.lock {
            if let Err(e) = lock.release(category).await {
                warn!(category = %category, error = %format!("{e:#}"), "category lock release failed");
            }
        }

        match result {
            Ok(summary) => CategoryStatus::Completed(summary),
            Err(e) => CategoryStatus::Failed(e),
        }
    }

    async fn backlog_then_poll(
        &self,
        category: OrderCategory,
    ) -> Result<CategorySummary, CategoryError> {
        let backlog = self.process_backlog(category).await?;

        let interrupted = matches!(backlog, BacklogOutcome::Processed { interrupted: true, .. });
        if interrupted || self.shutdown_requested() {
            return Ok(CategorySummary {
                backlog,
                poll: None,
            });
        }

        let poll = self.process_new_orders(category).await?;
        Ok(CategorySummary {
            backlog,
            poll: Some(poll),
        })
    }

    /// Replay the retriable backlog in bounded chunks.
    ///
    /// Never touches the checkpoint.
    pub async fn process_backlog(
        &self,
        category: OrderCategory,
    ) -> Result<BacklogOutcome, CategoryError> {
        info!(category = %category, "processing backlog");

        let backlog = self
            .ledger
            .retriable_transfers(category)
            .await
            .map_err(CategoryError::Ledger)?;

        if backlog.is_empty() {
            info!(category = %category, "no backlog");
            return Ok(BacklogOutcome::NoBacklog);
        }

        let chunks = chunk_backlog(&backlog, self.config.backlog_chunk_size);
        let mut dispatch = DispatchTally::default();
        let mut processed = 0usize;
        let mut interrupted = false;

        for chunk in &chunks {
            if self.shutdown_requested() {
                warn!(
                    category = %category,
                    remaining_chunks = chunks.len() - processed,
                    "shutdown requested; backlog interrupted between chunks"
                );
                interrupted = true;
                break;
            }

            let ids: Vec<String> = chunk.keys().cloned().collect();
            let orders = self
                .orders
                .list_orders_by_id(category, &ids)
                .await
                .map_err(CategoryError::OrderSource)?;

            if orders.len() < ids.len() {
                debug!(
                    category = %category,
                    source = self.orders.name(),
                    requested = ids.len(),
                    resolved = orders.len(),
                    "backlog chunk partially resolved upstream"
                );
            }

            let refreshed = self
                .ledger
                .refresh_transfers(chunk, &orders)
                .await
                .map_err(CategoryError::Ledger)?;

            dispatch.absorb(self.dispatch_transfers(&refreshed).await);
            processed += 1;
        }

        if dispatch.stranded > 0 {
            warn!(
                category = %category,
                stranded = dispatch.stranded,
                "backlog transfers left pending after failed dispatch"
            );
        }

        info!(
            category = %category,
            entries = backlog.len(),
            chunks = processed,
            emitted = dispatch.emitted,
            "backlog processed"
        );

        Ok(BacklogOutcome::Processed {
            entries: backlog.len(),
            chunks: processed,
            dispatch,
            interrupted,
        })
    }

    /// Poll orders since the checkpoint, dispatch their transfers and move
    /// the checkpoint forward.
    ///
    /// The checkpoint is written only after every dispatch of the pass has
    /// been attempted, and not at all if a transfer got stranded.
    pub async fn process_new_orders(
        &self,
        category: OrderCategory,
    ) -> Result<PollOutcome, CategoryError> {
        let raw = self
            .checkpoints
            .get(category)
            .await
            .map_err(CategoryError::CheckpointStore)?;
        let prior = parse_checkpoint(category, raw.as_deref())?;

        info!(
            category = %category,
            source = self.orders.name(),
            checkpoint = %prior.map(|c| c.to_rfc3339()).unwrap_or_default(),
            "processing recent orders"
        );

        let orders = match &prior {
            Some(since) => self.orders.list_orders_since(category, since).await,
            None => self.orders.list_orders(category).await,
        }
        .map_err(CategoryError::OrderSource)?;

        if orders.is_empty() {
            info!(category = %category, "no new orders");
            return Ok(PollOutcome::NoNewOrders);
        }

        let transfers = self
            .ledger
            .transfers_from_orders(&orders)
            .await
            .map_err(CategoryError::Ledger)?;

        let dispatch = self.dispatch_transfers(&transfers).await;
        if dispatch.stranded > 0 {
            return Err(CategoryError::DispatchIncomplete {
                stranded: dispatch.stranded,
            });
        }

        let checkpoint = self.advance_checkpoint(category, &orders, prior).await?;

        Ok(PollOutcome::Processed {
            orders: orders.len(),
            dispatch,
            checkpoint,
        })
    }

    async fn advance_checkpoint(
        &self,
        category: OrderCategory,
        orders: &[Order],
        prior: Option<Checkpoint>,
    ) -> Result<CheckpointChange, CategoryError> {
        let Some(mut next) = next_checkpoint(orders, prior) else {
            return Ok(CheckpointChange::Unchanged);
        };

        if let Some(p) = prior {
            if next < p {
                warn!(
                    category = %category,
                    checkpoint = %p,
                    last_order = %next,
                    "last listed order predates checkpoint; keeping checkpoint"
                );
                next = p;
            }
        }

        if Some(next) == prior {
            return Ok(CheckpointChange::Unchanged);
        }

        self.checkpoints
            .set(category, &next)
            .await
            .map_err(CategoryError::CheckpointStore)?;

        info!(category = %category, checkpoint = %next, "checkpoint advanced");

        Ok(CheckpointChange::Advanced {
            from: prior,
            to: next,
        })
    }

    /// Emit one event per eligible record; ineligible records are skipped.
    ///
    /// Each record is handled on its own: a failed emit sends that transfer
    /// back to the backlog and the loop moves on.
    pub async fn dispatch_transfers(&self, records: &[TransferRecord]) -> DispatchTally {
        let mut tally = DispatchTally::default();

        for rec in records {
            if !rec.is_dispatchable() || !self.claim_for_emit(rec.transfer_id) {
                tally.skipped += 1;
                continue;
            }

            let msg = ProcessTransferMessage::for_transfer(rec, Utc::now());
            match self.sink.emit(&msg).await {
                Ok(()) => {
                    tally.emitted += 1;
                    debug!(transfer_id = %rec.transfer_id, order_id = %rec.order_id, "transfer dispatched");
                    if let Err(e) = self.ledger.mark_dispatched(rec.transfer_id).await {
                        tally.unconfirmed += 1;
                        warn!(
                            transfer_id = %rec.transfer_id,
                            error = %format!("{e:#}"),
                            "dispatched transfer not recorded in ledger"
                        );
                    }
                }
                Err(e) => {
                    self.release_claim(rec.transfer_id);
                    let reason = format!("dispatch failed: {e:#}");
                    warn!(transfer_id = %rec.transfer_id, order_id = %rec.order_id, error = %reason, "transfer dispatch failed");

                    match self.ledger.mark_retriable(rec.transfer_id, &reason).await {
                        Ok(()) => tally.parked += 1,
                        Err(e) => {
                            tally.stranded += 1;
                            error!(
                                transfer_id = %rec.transfer_id,
                                error = %format!("{e:#}"),
                                "failed to park transfer for retry"
                            );
                        }
                    }
                }
            }
        }

        tally
    }

    /// `false` if this engine already emitted the transfer.
    fn claim_for_emit(&self, transfer_id: Uuid) -> bool {
        let mut emitted = self.emitted.lock().unwrap_or_else(|p| p.into_inner());
        emitted.insert(transfer_id)
    }

    fn release_claim(&self, transfer_id: Uuid) {
        let mut emitted = self.emitted.lock().unwrap_or_else(|p| p.into_inner());
        emitted.remove(&transfer_id);
    }
}

/// Absent or blank means "poll from the beginning".
fn parse_checkpoint(
    category: OrderCategory,
    raw: Option<&str>,
) -> Result<Option<Checkpoint>, CategoryError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => Checkpoint::parse(v)
            .map(Some)
            .map_err(|e| CategoryError::Configuration {
                category,
                reason: format!("{e:#}"),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_checkpoint_means_unset() {
        assert_eq!(parse_checkpoint(OrderCategory::Product, None).unwrap(), None);
        assert_eq!(parse_checkpoint(OrderCategory::Product, Some("  ")).unwrap(), None);
    }

    #[test]
    fn malformed_checkpoint_is_a_configuration_error() {
        let err = parse_checkpoint(OrderCategory::Service, Some("not-a-date")).unwrap_err();
        match err {
            CategoryError::Configuration { category, reason } => {
                assert_eq!(category, OrderCategory::Service);
                assert!(reason.contains("not-a-date"));
            }
            other => panic!("expected Configuration, got {other:?}"),
        }
    }

    #[test]
    fn valid_checkpoint_parses() {
        let cp = parse_checkpoint(OrderCategory::Product, Some("2024-01-02T03:04:05Z"))
            .unwrap()
            .unwrap();
        assert_eq!(cp.to_rfc3339(), "2024-01-02T03:04:05Z");
    }
}
