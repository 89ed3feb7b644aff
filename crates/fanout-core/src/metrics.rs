//! Pluggable metrics sink for coordinator runs.
//!
//! The coordinator reports through [`MetricsHandle`]; the default is [`NoopMetrics`].
//! A Prometheus implementation lives in the `fanout-prometheus` crate.
use std::{sync::Arc, time::Duration};

/// Final classification of an attempted item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    CredentialUnavailable,
}

impl Outcome {
    pub fn as_label(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::CredentialUnavailable => "credential_unavailable",
        }
    }
}

pub trait MetricsBackend: Send + Sync {
    /// The worker is about to be invoked for an item. Items that time out or are
    /// checkpointed while waiting for a credential never count as started.
    fn item_started(&self);
    /// An item produced its result.
    fn item_finished(&self, outcome: Outcome, duration: Duration);
    /// An item was skipped because of shutdown.
    fn item_checkpointed(&self);
    /// A credential wait ended, with or without a credential.
    fn credential_wait(&self, waited: Duration, acquired: bool);
    /// A held credential was benched.
    fn credential_rate_limited(&self);
}

pub type MetricsHandle = Arc<dyn MetricsBackend>;

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsBackend for NoopMetrics {
    fn item_started(&self) {}
    fn item_finished(&self, _outcome: Outcome, _duration: Duration) {}
    fn item_checkpointed(&self) {}
    fn credential_wait(&self, _waited: Duration, _acquired: bool) {}
    fn credential_rate_limited(&self) {}
}

pub fn noop() -> MetricsHandle {
    Arc::new(NoopMetrics)
}
