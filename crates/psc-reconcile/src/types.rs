use psc_schemas::{Checkpoint, OrderCategory};

use crate::CategoryError;

/// Default number of backlog entries resolved per marketplace request.
pub const DEFAULT_BACKLOG_CHUNK_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub backlog_chunk_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backlog_chunk_size: DEFAULT_BACKLOG_CHUNK_SIZE,
        }
    }
}

/// Per-pass dispatch accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchTally {
    /// Events handed to the sink.
    pub emitted: usize,
    /// Records that were not eligible.
    pub skipped: usize,
    /// Emit failed; the transfer was sent back to the backlog.
    pub parked: usize,
    /// Emit failed and the backlog could not be updated either.
    pub stranded: usize,
    /// Emitted, but the ledger did not record it as dispatched.
    pub unconfirmed: usize,
}

impl DispatchTally {
    pub fn absorb(&mut self, other: DispatchTally) {
        self.emitted += other.emitted;
        self.skipped += other.skipped;
        self.parked += other.parked;
        self.stranded += other.stranded;
        self.unconfirmed += other.unconfirmed;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BacklogOutcome {
    NoBacklog,
    Processed {
        entries: usize,
        chunks: usize,
        dispatch: DispatchTally,
        /// Shutdown was requested between chunks.
        interrupted: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointChange {
    Unchanged,
    Advanced {
        from: Option<Checkpoint>,
        to: Checkpoint,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    NoNewOrders,
    Processed {
        orders: usize,
        dispatch: DispatchTally,
        checkpoint: CheckpointChange,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySummary {
    pub backlog: BacklogOutcome,
    /// `None` when shutdown interrupted the run before the poll pass.
    pub poll: Option<PollOutcome>,
}

#[derive(Debug)]
pub enum CategoryStatus {
    Completed(CategorySummary),
    /// Another run holds this category.
    SkippedLocked,
    /// Shutdown was requested before this category started.
    NotStarted,
    Failed(CategoryError),
}

#[derive(Debug)]
pub struct CategoryReport {
    pub category: OrderCategory,
    pub status: CategoryStatus,
}

impl CategoryReport {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, CategoryStatus::Failed(_))
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub categories: Vec<CategoryReport>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        !self.categories.iter().any(CategoryReport::is_failure)
    }

    pub fn get(&self, category: OrderCategory) -> Option<&CategoryReport> {
        self.categories.iter().find(|r| r.category == category)
    }

    pub fn failures(&self) -> impl Iterator<Item = (OrderCategory, &CategoryError)> {
        self.categories.iter().filter_map(|r| match &r.status {
            CategoryStatus::Failed(e) => Some((r.category, e)),
            _ => None,
        })
    }
}
