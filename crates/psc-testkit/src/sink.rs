use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::{bail, Result};
use psc_reconcile::DispatchSink;
use psc_schemas::ProcessTransferMessage;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    emitted: Vec<ProcessTransferMessage>,
    attempts: usize,
    failing: HashSet<Uuid>,
    fail_all: bool,
}

/// Records every successfully emitted message. Individual transfers (or
/// everything) can be made to fail.
#[derive(Default)]
pub struct RecordingSink {
    inner: Mutex<Inner>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn fail_transfer(&self, transfer_id: Uuid) {
        self.lock().failing.insert(transfer_id);
    }

    pub fn fail_all(&self, fail: bool) {
        self.lock().fail_all = fail;
    }

    pub fn clear_failures(&self) {
        let mut g = self.lock();
        g.failing.clear();
        g.fail_all = false;
    }

    pub fn emitted(&self) -> Vec<ProcessTransferMessage> {
        self.lock().emitted.clone()
    }

    pub fn emitted_ids(&self) -> Vec<Uuid> {
        self.lock().emitted.iter().map(|m| m.transfer_id).collect()
    }

    pub fn count(&self) -> usize {
        self.lock().emitted.len()
    }

    /// Emit calls including failed ones.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }
}

#[async_trait::async_trait]
impl DispatchSink for RecordingSink {
    async fn emit(&self, message: &ProcessTransferMessage) -> Result<()> {
        let mut g = self.lock();
        g.attempts += 1;
        if g.fail_all || g.failing.contains(&message.transfer_id) {
            bail!("transport rejected transfer {}", message.transfer_id);
        }
        g.emitted.push(message.clone());
        Ok(())
    }
}
