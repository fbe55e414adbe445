//! `psc dispatch process-transfer`.
//!
//! Wires config, Postgres and the marketplace client into a
//! [`ReconciliationEngine`] and runs it once or on a fixed interval. A fresh
//! engine is built per pass; Ctrl-C sets the shared shutdown flag, which the
//! engine honours between categories and backlog chunks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use psc_config::secrets::resolve_secrets;
use psc_config::UnusedKeyPolicy;
use psc_db::{OutboxDispatchSink, PgCategoryLock, PgCheckpointStore, PgTransferLedger};
use psc_marketplace::MarketplaceClient;
use psc_reconcile::{
    BacklogOutcome, CategoryReport, CategoryStatus, CheckpointChange, DispatchTally, EngineConfig,
    PollOutcome, ReconciliationEngine, RunReport,
};
use tokio::sync::Notify;
use tracing::{error, info, warn};

use super::{check_unused_keys, load_config, parse_categories};

pub async fn process_transfer(
    config_paths: Vec<String>,
    categories: Vec<String>,
    every_secs: Option<u64>,
    strict_config: bool,
) -> Result<()> {
    let loaded = load_config(&config_paths)?;
    let policy = if strict_config {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    check_unused_keys(&loaded, policy)?;

    let cfg = loaded.connector()?;
    let secrets = resolve_secrets(&loaded.config_json)?;

    let categories = if categories.is_empty() {
        cfg.enabled_categories()
    } else {
        parse_categories(&categories)?
    };
    if categories.is_empty() {
        warn!("no categories enabled; nothing to do");
        return Ok(());
    }
    if every_secs == Some(0) {
        bail!("--every-secs must be > 0");
    }

    let pool = psc_db::connect_from_env().await?;
    let source = MarketplaceClient::with_options(
        cfg.marketplace.base_url.clone(),
        secrets.marketplace_api_key.clone(),
        cfg.marketplace.page_size,
        cfg.marketplace.timeout_secs,
    )?;
    let checkpoints = PgCheckpointStore::new(pool.clone());
    let ledger = PgTransferLedger::new(pool.clone());
    let sink = OutboxDispatchSink::new(pool.clone());
    let lock = PgCategoryLock::new(pool.clone());
    let engine_config = EngineConfig {
        backlog_chunk_size: cfg.dispatch.backlog_chunk_size,
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let wake = Arc::new(Notify::new());
    {
        let shutdown = Arc::clone(&shutdown);
        let wake = Arc::clone(&wake);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                shutdown.store(true, Ordering::SeqCst);
                wake.notify_one();
            }
        });
    }

    info!(
        config_hash = %loaded.config_hash,
        categories = ?categories,
        backlog_chunk_size = engine_config.backlog_chunk_size,
        every_secs = ?every_secs,
        "dispatch starting"
    );

    loop {
        let engine = ReconciliationEngine::new(&source, &checkpoints, &ledger, &sink)
            .with_config(engine_config.clone())
            .with_lock(&lock)
            .with_shutdown(Arc::clone(&shutdown));

        let report = engine.run(&categories).await;
        print_report(&report);

        let Some(secs) = every_secs else {
            return finish(&report);
        };

        // Periodic mode keeps going through transient failures only.
        if report.failures().any(|(_, e)| !e.is_transient()) {
            return finish(&report);
        }
        if shutdown.load(Ordering::SeqCst) {
            info!("dispatch stopped");
            return Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            _ = wake.notified() => {
                info!("dispatch stopped");
                return Ok(());
            }
        }
    }
}

fn finish(report: &RunReport) -> Result<()> {
    if report.is_success() {
        return Ok(());
    }
    let failed: Vec<String> = report
        .failures()
        .map(|(c, e)| {
            error!(category = %c, error = %e, "category failed");
            c.to_string()
        })
        .collect();
    bail!("DISPATCH_FAILED: categories={}", failed.join(","))
}

fn print_report(report: &RunReport) {
    for r in &report.categories {
        println!("{}", describe(r));
    }
}

/// One `key=value` line per category.
fn describe(r: &CategoryReport) -> String {
    match &r.status {
        CategoryStatus::Completed(s) => {
            let mut tally = DispatchTally::default();
            let (backlog_entries, interrupted) = match &s.backlog {
                BacklogOutcome::NoBacklog => (0, false),
                BacklogOutcome::Processed {
                    entries,
                    dispatch,
                    interrupted,
                    ..
                } => {
                    tally.absorb(*dispatch);
                    (*entries, *interrupted)
                }
            };
            let (new_orders, checkpoint) = match &s.poll {
                None => (0, "SKIPPED".to_string()),
                Some(PollOutcome::NoNewOrders) => (0, "UNCHANGED".to_string()),
                Some(PollOutcome::Processed {
                    orders,
                    dispatch,
                    checkpoint,
                }) => {
                    tally.absorb(*dispatch);
                    let cp = match checkpoint {
                        CheckpointChange::Unchanged => "UNCHANGED".to_string(),
                        CheckpointChange::Advanced { to, .. } => to.to_rfc3339(),
                    };
                    (*orders, cp)
                }
            };
            format!(
                "category={} status=COMPLETED backlog_entries={} new_orders={} emitted={} skipped={} parked={} unconfirmed={} checkpoint={} interrupted={}",
                r.category,
                backlog_entries,
                new_orders,
                tally.emitted,
                tally.skipped,
                tally.parked,
                tally.unconfirmed,
                checkpoint,
                interrupted
            )
        }
        CategoryStatus::SkippedLocked => {
            format!("category={} status=SKIPPED_LOCKED", r.category)
        }
        CategoryStatus::NotStarted => format!("category={} status=NOT_STARTED", r.category),
        CategoryStatus::Failed(e) => format!(
            "category={} status=FAILED transient={} error={}",
            r.category,
            e.is_transient(),
            e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use psc_reconcile::{CategoryError, CategorySummary};
    use psc_schemas::{Checkpoint, OrderCategory};

    fn tally(emitted: usize, skipped: usize) -> DispatchTally {
        DispatchTally {
            emitted,
            skipped,
            ..DispatchTally::default()
        }
    }

    #[test]
    fn completed_line_sums_backlog_and_poll_dispatch() {
        let to = Checkpoint::new(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
        let r = CategoryReport {
            category: OrderCategory::Product,
            status: CategoryStatus::Completed(CategorySummary {
                backlog: BacklogOutcome::Processed {
                    entries: 4,
                    chunks: 1,
                    dispatch: tally(3, 1),
                    interrupted: false,
                },
                poll: Some(PollOutcome::Processed {
                    orders: 2,
                    dispatch: tally(2, 0),
                    checkpoint: CheckpointChange::Advanced { from: None, to },
                }),
            }),
        };
        let line = describe(&r);
        assert!(line.starts_with("category=PRODUCT status=COMPLETED"), "{line}");
        assert!(line.contains("backlog_entries=4"), "{line}");
        assert!(line.contains("new_orders=2"), "{line}");
        assert!(line.contains("emitted=5"), "{line}");
        assert!(line.contains("skipped=1"), "{line}");
        assert!(line.contains("checkpoint=2024-03-01T10:00:00Z"), "{line}");
    }

    #[test]
    fn interrupted_run_reports_skipped_poll() {
        let r = CategoryReport {
            category: OrderCategory::Service,
            status: CategoryStatus::Completed(CategorySummary {
                backlog: BacklogOutcome::Processed {
                    entries: 25,
                    chunks: 1,
                    dispatch: tally(10, 0),
                    interrupted: true,
                },
                poll: None,
            }),
        };
        let line = describe(&r);
        assert!(line.contains("checkpoint=SKIPPED"), "{line}");
        assert!(line.contains("interrupted=true"), "{line}");
    }

    #[test]
    fn failed_report_is_an_error_naming_categories() {
        let report = RunReport {
            categories: vec![
                CategoryReport {
                    category: OrderCategory::Product,
                    status: CategoryStatus::SkippedLocked,
                },
                CategoryReport {
                    category: OrderCategory::Service,
                    status: CategoryStatus::Failed(CategoryError::Configuration {
                        category: OrderCategory::Service,
                        reason: "bad checkpoint".to_string(),
                    }),
                },
            ],
        };
        assert_eq!(describe(&report.categories[0]), "category=PRODUCT status=SKIPPED_LOCKED");
        assert!(describe(&report.categories[1]).contains("transient=false"));

        let err = finish(&report).unwrap_err();
        assert!(err.to_string().contains("categories=SERVICE"), "{err}");
    }

    #[test]
    fn successful_report_finishes_ok() {
        let report = RunReport {
            categories: vec![CategoryReport {
                category: OrderCategory::Product,
                status: CategoryStatus::NotStarted,
            }],
        };
        assert!(finish(&report).is_ok());
    }
}
