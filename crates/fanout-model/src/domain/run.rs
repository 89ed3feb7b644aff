use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Checkpoint, ProgressStats, WorkItemResult};

/// Lifecycle of a single coordinator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunPhase {
    /// Admitting and executing items.
    Running,
    /// An interrupt arrived; not yet acted upon.
    ShutdownRequested,
    /// No new items start; in-flight items run to completion.
    Draining,
    /// All items resolved, results returned.
    Stopped,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Running => "running",
            RunPhase::ShutdownRequested => "shutdown-requested",
            RunPhase::Draining => "draining",
            RunPhase::Stopped => "stopped",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a run hands back to its caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub stats: ProgressStats,
    /// In completion order.
    pub results: Vec<WorkItemResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checkpoints: Vec<Checkpoint>,
    /// `true` if shutdown was requested during the run.
    pub interrupted: bool,
}

impl RunReport {
    pub fn failures(&self) -> impl Iterator<Item = &WorkItemResult> {
        self.results.iter().filter(|r| !r.success)
    }

    /// `true` when every item ran and succeeded.
    pub fn is_clean(&self) -> bool {
        !self.interrupted && self.stats.failed == 0 && self.checkpoints.is_empty()
    }
}
