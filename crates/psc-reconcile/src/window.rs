//! Backlog chunking and checkpoint advancement.
//!
//! # Invariants
//!
//! - Chunks partition the backlog: every entry lands in exactly one chunk,
//!   no chunk exceeds the configured size, only the last may be smaller.
//! - The next checkpoint is the creation time of the **last** listed order
//!   (the order source lists oldest first). An empty listing leaves the
//!   checkpoint unchanged.
//! - Only the incremental poll moves the checkpoint. Backlog processing
//!   never does.

use std::collections::BTreeMap;

use psc_schemas::{Checkpoint, Order};

/// Split `backlog` into consecutive chunks of at most `size` entries.
///
/// `size == 0` is treated as 1.
pub fn chunk_backlog<V: Clone>(
    backlog: &BTreeMap<String, V>,
    size: usize,
) -> Vec<BTreeMap<String, V>> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(backlog.len().div_ceil(size));
    let mut current = BTreeMap::new();

    for (k, v) in backlog {
        current.insert(k.clone(), v.clone());
        if current.len() == size {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Checkpoint after a poll pass over `orders`.
pub fn next_checkpoint(orders: &[Order], prior: Option<Checkpoint>) -> Option<Checkpoint> {
    match orders.last() {
        Some(last) => Some(Checkpoint::new(last.created_at_utc)),
        None => prior,
    }
}
