//! Bounded-concurrency execution of work items against a shared credential pool.
//!
//! A run moves through [`RunPhase`]: `Running` while items are admitted, `ShutdownRequested`
//! once an interrupt sets the flag, `Draining` while in-flight items finish, `Stopped` when
//! the report is returned. Items are admitted only after a semaphore permit is granted, so
//! at most `max_workers` items exist as tasks at any instant.
mod context;
mod ledger;
mod shutdown;

pub use context::WorkContext;
pub use shutdown::Shutdown;

use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    future::Future,
    sync::Arc,
    time::Duration,
};

use fanout_model::{CheckpointState, ItemId, RunPhase, RunReport, WorkItemResult};
use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore},
    task::{JoinError, JoinSet},
    time::Instant,
};
use tokio_util::task::AbortOnDropHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::{
    config::{CoordinatorConfig, MAX_WORKERS_LIMIT},
    error::CoordinatorError,
    metrics::{self, MetricsHandle, Outcome},
    output::OutputMultiplexer,
    pool::{Credential, CredentialPool},
    simulate::RateLimitSimulator,
};
use context::Lease;
use ledger::Ledger;

pub const CREDENTIAL_UNAVAILABLE: &str = "credential unavailable";

pub struct WorkCoordinator {
    max_workers: usize,
    cfg: CoordinatorConfig,
    pool: Option<Arc<CredentialPool>>,
    output: Arc<OutputMultiplexer>,
    metrics: MetricsHandle,
    shutdown: Option<Shutdown>,
}

impl WorkCoordinator {
    pub fn new(cfg: CoordinatorConfig) -> Self {
        Self {
            max_workers: clamp_workers(cfg.max_workers),
            cfg,
            pool: None,
            output: Arc::new(OutputMultiplexer::stdout()),
            metrics: metrics::noop(),
            shutdown: None,
        }
    }

    /// Coordinate credentials through `pool`. Without one, items run with no credential.
    pub fn with_pool(mut self, pool: Arc<CredentialPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_output(mut self, output: Arc<OutputMultiplexer>) -> Self {
        self.output = output;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    /// Use an externally owned stop flag instead of a fresh one per run.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Effective parallelism after clamping.
    #[inline]
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn output(&self) -> Arc<OutputMultiplexer> {
        Arc::clone(&self.output)
    }

    /// Run `worker` over `items`, at most `max_workers` at a time.
    ///
    /// Per-item failures, panics and credential timeouts become [`WorkItemResult`]s.
    /// Invalid or duplicate ids, or an empty pool, are rejected before anything runs.
    /// With `dry_run`, ids are validated and listed but no credential is taken and no
    /// worker is called.
    pub async fn execute_parallel<T, W, Fut, E, I>(
        &self,
        items: Vec<T>,
        worker: W,
        id_fn: I,
        dry_run: bool,
    ) -> Result<RunReport, CoordinatorError>
    where
        T: Send + 'static,
        W: Fn(T, WorkContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
        I: Fn(&T) -> String,
    {
        let ids = collect_ids(&items, &id_fn)?;
        if let Some(pool) = &self.pool
            && pool.is_empty()
        {
            return Err(CoordinatorError::EmptyPool);
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("run", run_id = %run_id, total = ids.len(), dry_run);

        if dry_run {
            return Ok(span.in_scope(|| self.dry_run(run_id, &ids)));
        }

        Ok(self.run(run_id, ids, items, worker).instrument(span).await)
    }

    fn dry_run(&self, run_id: String, ids: &[ItemId]) -> RunReport {
        for id in ids {
            if let Err(e) = self.output.write(id.as_str(), "would run\n") {
                warn!(id = %id, error = %e, "failed to write dry-run line");
            }
        }
        info!(items = ids.len(), "dry run complete; nothing executed");
        RunReport {
            run_id,
            ..Default::default()
        }
    }

    async fn run<T, W, Fut, E>(
        &self,
        run_id: String,
        ids: Vec<ItemId>,
        items: Vec<T>,
        worker: W,
    ) -> RunReport
    where
        T: Send + 'static,
        W: Fn(T, WorkContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let shutdown = self.shutdown.clone().unwrap_or_default();
        let _signals = self
            .cfg
            .handle_signals
            .then(|| shutdown.listen_os_signals());

        let total = ids.len();
        let shared = Arc::new(Shared {
            worker,
            pool: self.pool.clone(),
            output: Arc::clone(&self.output),
            metrics: Arc::clone(&self.metrics),
            shutdown: shutdown.clone(),
            simulator: self.cfg.rate_limit_simulation.map(RateLimitSimulator::new),
            acquire_timeout: self.cfg.acquire_timeout,
            ledger: Ledger::new(total),
        });

        info!(
            phase = %RunPhase::Running,
            max_workers = self.max_workers,
            pooled = self.pool.is_some(),
            "run started"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, ItemId> = HashMap::new();
        let mut queue = ids.into_iter().zip(items);

        for (id, item) in queue.by_ref() {
            let permit = tokio::select! {
                biased;
                _ = shutdown.requested() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                shared.checkpoint(id, CheckpointState::Pending);
                break;
            };

            let handle = tasks.spawn(run_item(Arc::clone(&shared), id.clone(), item, permit));
            in_flight.insert(handle.id(), id);

            while let Some(joined) = tasks.try_join_next_with_id() {
                settle(joined, &mut in_flight, &shared);
            }
        }

        let skipped: Vec<ItemId> = queue.map(|(id, _)| id).collect();
        if shutdown.is_requested() {
            info!(
                phase = %RunPhase::ShutdownRequested,
                skipped = skipped.len(),
                "no further items will start"
            );
        }
        for id in skipped {
            shared.checkpoint(id, CheckpointState::Pending);
        }

        if shutdown.is_requested() {
            info!(
                phase = %RunPhase::Draining,
                in_flight = tasks.len(),
                "waiting for in-flight items"
            );
        }
        while let Some(joined) = tasks.join_next_with_id().await {
            settle(joined, &mut in_flight, &shared);
        }

        if let Err(e) = self.output.flush_all() {
            warn!(error = %e, "failed to flush output");
        }

        let interrupted = shutdown.is_requested();
        let (stats, results, checkpoints) = shared.ledger.drain();

        info!(
            phase = %RunPhase::Stopped,
            completed = stats.completed,
            succeeded = stats.succeeded,
            failed = stats.failed,
            checkpointed = stats.checkpointed,
            interrupted,
            "run finished"
        );

        RunReport {
            run_id,
            stats,
            results,
            checkpoints,
            interrupted,
        }
    }
}

/// State shared by every item task of one run.
struct Shared<W> {
    worker: W,
    pool: Option<Arc<CredentialPool>>,
    output: Arc<OutputMultiplexer>,
    metrics: MetricsHandle,
    shutdown: Shutdown,
    simulator: Option<RateLimitSimulator>,
    acquire_timeout: Duration,
    ledger: Ledger,
}

impl<W> Shared<W> {
    fn checkpoint(&self, id: ItemId, state: CheckpointState) {
        self.metrics.item_checkpointed();
        self.ledger.checkpoint(id, state);
    }
}

enum Acquisition {
    Acquired(Credential),
    TimedOut,
    Interrupted,
}

async fn run_item<T, W, Fut, E>(
    shared: Arc<Shared<W>>,
    id: ItemId,
    item: T,
    _permit: OwnedSemaphorePermit,
) where
    T: Send + 'static,
    W: Fn(T, WorkContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let started = Instant::now();
    if shared.shutdown.is_requested() {
        shared.checkpoint(id, CheckpointState::Pending);
        return;
    }
    debug!(id = %id, "item admitted");

    let mut waited = Duration::ZERO;
    let credential = match &shared.pool {
        None => None,
        Some(pool) => {
            let wait_started = Instant::now();
            let acquisition = acquire_credential(&shared, pool).await;
            waited = wait_started.elapsed();

            match acquisition {
                Acquisition::Acquired(credential) => {
                    shared.metrics.credential_wait(waited, true);
                    debug!(
                        id = %id,
                        credential = %credential,
                        waited_ms = waited.as_millis() as u64,
                        "credential acquired"
                    );
                    Some(credential)
                }
                Acquisition::TimedOut => {
                    shared.metrics.credential_wait(waited, false);
                    shared
                        .metrics
                        .item_finished(Outcome::CredentialUnavailable, started.elapsed());
                    shared.ledger.complete(WorkItemResult::failed(
                        id,
                        CREDENTIAL_UNAVAILABLE,
                        started.elapsed(),
                        waited,
                    ));
                    return;
                }
                Acquisition::Interrupted => {
                    shared.metrics.credential_wait(waited, false);
                    shared.checkpoint(id, CheckpointState::AwaitingCredential);
                    return;
                }
            }
        }
    };

    let lease = Arc::new(Lease::new(
        shared.pool.clone(),
        credential,
        shared.acquire_timeout,
        Arc::clone(&shared.metrics),
    ));
    let ctx = WorkContext::new(
        id.clone(),
        shared.output.handle(&id),
        Arc::clone(&lease),
        shared.shutdown.clone(),
    );

    shared.metrics.item_started();
    // The worker runs in its own task so a panic is contained and reported here. The
    // handle aborts that task if this one is dropped first.
    let outcome = AbortOnDropHandle::new(tokio::spawn((shared.worker)(item, ctx))).await;

    lease.release();
    if let Err(e) = shared.output.flush(id.as_str()) {
        warn!(id = %id, error = %e, "failed to flush item output");
    }

    let duration = started.elapsed();
    let result = match outcome {
        Ok(Ok(())) => WorkItemResult::succeeded(id, duration, waited),
        Ok(Err(e)) => WorkItemResult::failed(id, e.to_string(), duration, waited),
        Err(e) => WorkItemResult::failed(id, join_error_message(e), duration, waited),
    };
    let outcome = if result.success {
        Outcome::Success
    } else {
        Outcome::Failure
    };
    shared.metrics.item_finished(outcome, duration);
    shared.ledger.complete(result);
}

/// Reserve a credential, honoring the simulated rate limit and the shutdown flag.
async fn acquire_credential<W>(shared: &Shared<W>, pool: &CredentialPool) -> Acquisition {
    let deadline = Instant::now() + shared.acquire_timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let acquired = tokio::select! {
            biased;
            _ = shared.shutdown.requested() => return Acquisition::Interrupted,
            credential = pool.acquire(remaining) => credential,
        };
        let Some(credential) = acquired else {
            return Acquisition::TimedOut;
        };

        match &shared.simulator {
            Some(sim) if sim.should_inject() => {
                let backoff = sim.config().backoff;
                warn!(
                    credential = %credential,
                    backoff_ms = backoff.as_millis() as u64,
                    "simulated rate limit"
                );
                pool.mark_rate_limited(&credential, backoff);
                shared.metrics.credential_rate_limited();
            }
            _ => return Acquisition::Acquired(credential),
        }
    }
}

/// Account for a joined item task; item tasks record their own result unless they panicked.
fn settle<W>(
    joined: Result<(tokio::task::Id, ()), JoinError>,
    in_flight: &mut HashMap<tokio::task::Id, ItemId>,
    shared: &Shared<W>,
) {
    match joined {
        Ok((task_id, ())) => {
            in_flight.remove(&task_id);
        }
        Err(e) => {
            let Some(id) = in_flight.remove(&e.id()) else {
                error!(error = %e, "unknown item task failed");
                return;
            };
            error!(id = %id, error = %e, "item task aborted outside the worker");
            shared.metrics.item_finished(Outcome::Failure, Duration::ZERO);
            shared.ledger.complete(WorkItemResult::failed(
                id,
                join_error_message(e),
                Duration::ZERO,
                Duration::ZERO,
            ));
        }
    }
}

fn join_error_message(e: JoinError) -> String {
    if !e.is_panic() {
        return "worker cancelled".to_string();
    }
    let payload = e.into_panic();
    let msg = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("worker panicked: {msg}")
}

fn collect_ids<T, I>(items: &[T], id_fn: &I) -> Result<Vec<ItemId>, CoordinatorError>
where
    I: Fn(&T) -> String,
{
    let mut seen = HashSet::with_capacity(items.len());
    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        let raw = id_fn(item);
        let id = match ItemId::new(raw.as_str()) {
            Ok(id) => id,
            Err(source) => return Err(CoordinatorError::InvalidIdentifier { id: raw, source }),
        };
        if !seen.insert(id.clone()) {
            return Err(CoordinatorError::DuplicateId(raw));
        }
        ids.push(id);
    }
    Ok(ids)
}

fn clamp_workers(requested: usize) -> usize {
    if requested > MAX_WORKERS_LIMIT {
        warn!(
            requested,
            limit = MAX_WORKERS_LIMIT,
            "max_workers above limit; clamping"
        );
        MAX_WORKERS_LIMIT
    } else if requested == 0 {
        warn!("max_workers of 0 requested; using 1");
        1
    } else {
        requested
    }
}
