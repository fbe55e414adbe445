use psc_schemas::OrderCategory;
use thiserror::Error;

/// Why one category's run stopped early.
///
/// A category error never aborts the other categories of the same run.
#[derive(Debug, Error)]
pub enum CategoryError {
    #[error("order source failed: {0:#}")]
    OrderSource(anyhow::Error),

    #[error("checkpoint store failed: {0:#}")]
    CheckpointStore(anyhow::Error),

    #[error("transfer ledger failed: {0:#}")]
    Ledger(anyhow::Error),

    #[error("category lock failed: {0:#}")]
    Lock(anyhow::Error),

    /// Stored state is unusable. Raised before anything is written.
    #[error("invalid configuration for {category}: {reason}")]
    Configuration {
        category: OrderCategory,
        reason: String,
    },

    /// Some eligible transfers could neither be emitted nor parked in the
    /// backlog; the checkpoint was left where it was.
    #[error("{stranded} transfer(s) could not be dispatched or parked for retry")]
    DispatchIncomplete { stranded: usize },
}

impl CategoryError {
    /// Transient failures are expected to clear on the next invocation.
    pub fn is_transient(&self) -> bool {
        !matches!(self, CategoryError::Configuration { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_not_transient() {
        let e = CategoryError::Configuration {
            category: OrderCategory::Product,
            reason: "bad checkpoint".to_string(),
        };
        assert!(!e.is_transient());
        assert!(CategoryError::OrderSource(anyhow::anyhow!("timeout")).is_transient());
        assert!(CategoryError::DispatchIncomplete { stranded: 1 }.is_transient());
    }

    #[test]
    fn display_includes_context_chain() {
        let inner = anyhow::anyhow!("connection reset").context("list orders");
        let e = CategoryError::OrderSource(inner);
        assert_eq!(e.to_string(), "order source failed: list orders: connection reset");
    }
}
