use std::sync::{Mutex, MutexGuard, PoisonError};

use fanout_model::{Checkpoint, CheckpointState, ItemId, ProgressStats, WorkItemResult};
use tracing::{debug, info, warn};

/// Single mutation point for a run's stats, results and checkpoints.
pub(crate) struct Ledger {
    inner: Mutex<LedgerInner>,
}

struct LedgerInner {
    stats: ProgressStats,
    results: Vec<WorkItemResult>,
    checkpoints: Vec<Checkpoint>,
}

impl Ledger {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                stats: ProgressStats::new(total),
                results: Vec::with_capacity(total),
                checkpoints: Vec::new(),
            }),
        }
    }

    pub(crate) fn complete(&self, result: WorkItemResult) {
        let mut inner = self.lock();
        inner.stats.record(result.success);
        let stats = inner.stats;

        if result.success {
            info!(
                id = %result.id,
                completed = stats.completed,
                total = stats.total,
                duration_ms = result.duration.as_millis() as u64,
                "item succeeded"
            );
        } else {
            warn!(
                id = %result.id,
                completed = stats.completed,
                total = stats.total,
                error = result.error.as_deref().unwrap_or("unknown"),
                "item failed"
            );
        }
        inner.results.push(result);
    }

    pub(crate) fn checkpoint(&self, id: ItemId, state: CheckpointState) {
        let mut inner = self.lock();
        debug!(id = %id, ?state, "item checkpointed");
        inner.stats.record_checkpoint();
        inner.checkpoints.push(Checkpoint::new(id, state));
    }

    /// Take everything recorded so far, leaving the counters in place.
    pub(crate) fn drain(&self) -> (ProgressStats, Vec<WorkItemResult>, Vec<Checkpoint>) {
        let mut inner = self.lock();
        let results = std::mem::take(&mut inner.results);
        let checkpoints = std::mem::take(&mut inner.checkpoints);
        (inner.stats, results, checkpoints)
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn id(s: &str) -> ItemId {
        ItemId::new(s).unwrap()
    }

    #[test]
    fn accounts_for_every_item() {
        let ledger = Ledger::new(3);
        ledger.complete(WorkItemResult::succeeded(id("a"), Duration::ZERO, Duration::ZERO));
        ledger.complete(WorkItemResult::failed(id("b"), "boom", Duration::ZERO, Duration::ZERO));
        ledger.checkpoint(id("c"), CheckpointState::Pending);

        let (stats, results, checkpoints) = ledger.drain();
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.checkpointed, 1);
        assert!(stats.is_settled());
        assert_eq!(results.len(), 2);
        assert_eq!(checkpoints, vec![Checkpoint::new(id("c"), CheckpointState::Pending)]);
    }
}
