use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use fanout_model::ItemId;
use tracing::debug;

use crate::{
    coordinator::shutdown::Shutdown,
    metrics::MetricsHandle,
    output::ItemOutput,
    pool::{Credential, CredentialPool},
};

/// What a worker gets besides its item.
///
/// Cloning shares the same credential slot: whichever credential the context holds when
/// the worker returns is released by the coordinator.
#[derive(Clone)]
pub struct WorkContext {
    id: ItemId,
    output: ItemOutput,
    lease: Arc<Lease>,
    shutdown: Shutdown,
}

pub(crate) struct Lease {
    pool: Option<Arc<CredentialPool>>,
    held: Mutex<Option<Credential>>,
    acquire_timeout: Duration,
    metrics: MetricsHandle,
}

impl Lease {
    pub(crate) fn new(
        pool: Option<Arc<CredentialPool>>,
        credential: Option<Credential>,
        acquire_timeout: Duration,
        metrics: MetricsHandle,
    ) -> Self {
        Self {
            pool,
            held: Mutex::new(credential),
            acquire_timeout,
            metrics,
        }
    }

    /// Hand the held credential back to the pool, if any.
    pub(crate) fn release(&self) {
        let held = self.lock().take();
        if let (Some(pool), Some(credential)) = (&self.pool, held) {
            pool.release(&credential);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Credential>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Covers the item task being aborted mid-worker, e.g. when the run future is dropped.
impl Drop for Lease {
    fn drop(&mut self) {
        self.release();
    }
}

impl WorkContext {
    pub(crate) fn new(id: ItemId, output: ItemOutput, lease: Arc<Lease>, shutdown: Shutdown) -> Self {
        Self {
            id,
            output,
            lease,
            shutdown,
        }
    }

    #[inline]
    pub fn id(&self) -> &ItemId {
        &self.id
    }

    /// Credential reserved for this item; `None` when running without a pool.
    pub fn credential(&self) -> Option<Credential> {
        self.lease.lock().clone()
    }

    /// Line-buffered output tagged with this item's id.
    pub fn output(&self) -> ItemOutput {
        self.output.clone()
    }

    /// `true` once the run is draining. Workers may use it to wrap up early.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.is_requested()
    }

    /// Report the held credential's quota as exhausted for `backoff`.
    ///
    /// The credential is benched in the pool and dropped from this context.
    pub fn mark_rate_limited(&self, backoff: Duration) {
        let held = self.lease.lock().take();
        if let (Some(pool), Some(credential)) = (&self.lease.pool, held) {
            debug!(id = %self.id, credential = %credential, "worker reported rate limit");
            pool.mark_rate_limited(&credential, backoff);
            self.lease.metrics.credential_rate_limited();
        }
    }

    /// Bench the held credential for `backoff`, then reserve another one.
    ///
    /// Waits at most the coordinator's acquire timeout. Returns `None` without a pool or
    /// when nothing frees up in time.
    pub async fn rotate_credential(&self, backoff: Duration) -> Option<Credential> {
        self.mark_rate_limited(backoff);
        let pool = self.lease.pool.as_ref()?;

        let started = tokio::time::Instant::now();
        let next = pool.acquire(self.lease.acquire_timeout).await;
        self.lease
            .metrics
            .credential_wait(started.elapsed(), next.is_some());

        if let Some(credential) = &next {
            *self.lease.lock() = Some(credential.clone());
        }
        next
    }
}
