use serde::{Deserialize, Serialize};

/// Counters describing how far a run has progressed.
///
/// Always `completed == succeeded + failed` and `completed + checkpointed <= total`.
/// Once a run has stopped every item is accounted for: `completed + checkpointed == total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressStats {
    pub total: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items that were not run because shutdown was requested.
    pub checkpointed: usize,
}

impl ProgressStats {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Count one attempted item.
    pub fn record(&mut self, success: bool) {
        self.completed += 1;
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Count one item that was skipped because of shutdown.
    pub fn record_checkpoint(&mut self) {
        self.checkpointed += 1;
    }

    /// Items neither attempted nor checkpointed yet.
    pub fn remaining(&self) -> usize {
        self.total
            .saturating_sub(self.completed + self.checkpointed)
    }

    /// `true` once every item is accounted for.
    pub fn is_settled(&self) -> bool {
        self.remaining() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_keeps_counters_consistent() {
        let mut stats = ProgressStats::new(4);
        stats.record(true);
        stats.record(false);
        stats.record(true);

        assert_eq!(stats.completed, 3);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, stats.succeeded + stats.failed);
        assert_eq!(stats.remaining(), 1);
        assert!(!stats.is_settled());

        stats.record_checkpoint();
        assert!(stats.is_settled());
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_string(&ProgressStats::new(2)).unwrap();
        assert_eq!(
            json,
            r#"{"total":2,"completed":0,"succeeded":0,"failed":0,"checkpointed":0}"#
        );
    }
}
