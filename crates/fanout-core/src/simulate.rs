use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::RateLimitSimulation;

/// Counts acquisitions and flags every Nth one as rate-limited.
pub(crate) struct RateLimitSimulator {
    cfg: RateLimitSimulation,
    acquisitions: AtomicU64,
}

impl RateLimitSimulator {
    pub(crate) fn new(cfg: RateLimitSimulation) -> Self {
        Self {
            cfg,
            acquisitions: AtomicU64::new(0),
        }
    }

    pub(crate) fn config(&self) -> &RateLimitSimulation {
        &self.cfg
    }

    /// Record one acquisition; `true` if it must be treated as a 429.
    pub(crate) fn should_inject(&self) -> bool {
        let every = self.cfg.every.max(1) as u64;
        let n = self.acquisitions.fetch_add(1, Ordering::Relaxed) + 1;
        n % every == 0
    }
}
