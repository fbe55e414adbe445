use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use anyhow::{bail, Result};
use psc_reconcile::{CategoryLock, CheckpointStore};
use psc_schemas::{Checkpoint, OrderCategory};

#[derive(Default)]
struct StoreInner {
    values: BTreeMap<OrderCategory, String>,
    writes: Vec<(OrderCategory, String)>,
    fail_get: bool,
    fail_set: bool,
}

/// In-memory checkpoint store that keeps raw values, like the config table.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    inner: Mutex<StoreInner>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Preload a raw value without counting it as a write.
    pub fn with_raw(self, category: OrderCategory, raw: &str) -> Self {
        self.lock().values.insert(category, raw.to_string());
        self
    }

    pub fn raw(&self, category: OrderCategory) -> Option<String> {
        self.lock().values.get(&category).cloned()
    }

    pub fn checkpoint(&self, category: OrderCategory) -> Option<Checkpoint> {
        self.raw(category).and_then(|v| Checkpoint::parse(&v).ok())
    }

    /// Persisted writes, in order.
    pub fn writes(&self) -> Vec<(OrderCategory, String)> {
        self.lock().writes.clone()
    }

    pub fn fail_get(&self, fail: bool) {
        self.lock().fail_get = fail;
    }

    pub fn fail_set(&self, fail: bool) {
        self.lock().fail_set = fail;
    }
}

#[async_trait::async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, category: OrderCategory) -> Result<Option<String>> {
        let g = self.lock();
        if g.fail_get {
            bail!("config store unavailable");
        }
        Ok(g.values.get(&category).cloned())
    }

    async fn set(&self, category: OrderCategory, checkpoint: &Checkpoint) -> Result<()> {
        let mut g = self.lock();
        if g.fail_set {
            bail!("config store write failed");
        }
        let raw = checkpoint.to_rfc3339();
        g.values.insert(category, raw.clone());
        g.writes.push((category, raw));
        Ok(())
    }
}

#[derive(Default)]
struct LockInner {
    held: BTreeSet<OrderCategory>,
    acquisitions: usize,
    releases: usize,
}

/// Process-local category lock. [`Self::hold`] simulates a concurrent run.
#[derive(Default)]
pub struct MemoryCategoryLock {
    inner: Mutex<LockInner>,
}

impl MemoryCategoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LockInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn hold(&self, category: OrderCategory) {
        self.lock().held.insert(category);
    }

    pub fn is_held(&self, category: OrderCategory) -> bool {
        self.lock().held.contains(&category)
    }

    pub fn acquisitions(&self) -> usize {
        self.lock().acquisitions
    }

    pub fn releases(&self) -> usize {
        self.lock().releases
    }
}

#[async_trait::async_trait]
impl CategoryLock for MemoryCategoryLock {
    async fn try_acquire(&self, category: OrderCategory) -> Result<bool> {
        let mut g = self.lock();
        if !g.held.insert(category) {
            return Ok(false);
        }
        g.acquisitions += 1;
        Ok(true)
    }

    async fn release(&self, category: OrderCategory) -> Result<()> {
        let mut g = self.lock();
        g.held.remove(&category);
        g.releases += 1;
        Ok(())
    }
}
