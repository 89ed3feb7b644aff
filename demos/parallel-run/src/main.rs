use std::{collections::HashSet, io::Write, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::{info, warn};

use fanout_core::{
    CheckpointStore, CoordinatorConfig, CredentialPool, WorkContext, WorkCoordinator,
    credential_keys_from_env,
};
use fanout_observe::{LoggerConfig, log_report, logger_init};
use fanout_prometheus::PrometheusMetrics;

const ENV_ITEMS: &str = "FANOUT_DEMO_ITEMS";
const ENV_CHECKPOINT_DIR: &str = "FANOUT_CHECKPOINT_DIR";
const ENV_METRICS_ADDR: &str = "FANOUT_METRICS_ADDR";
const DEFAULT_ITEMS: usize = 12;
const THROTTLE_BACKOFF: Duration = Duration::from_secs(2);

/// Synthetic unit of work.
#[derive(Debug, Clone)]
struct Job {
    name: String,
    steps: u32,
    throttled: bool,
    fails: bool,
}

impl Job {
    fn generate(n: usize) -> Vec<Job> {
        (0..n)
            .map(|i| Job {
                name: format!("job-{i:02}"),
                steps: 2 + (i % 4) as u32,
                throttled: i % 5 == 4,
                fails: i % 7 == 6,
            })
            .collect()
    }
}

async fn run_job(job: Job, ctx: WorkContext) -> Result<(), String> {
    let mut out = ctx.output();

    if job.throttled && ctx.credential().is_some() {
        writeln!(out, "upstream answered 429").map_err(|e| e.to_string())?;
        match ctx.rotate_credential(THROTTLE_BACKOFF).await {
            Some(next) => writeln!(out, "retrying with {next}").map_err(|e| e.to_string())?,
            None => return Err("rate limited and no credential freed up".to_string()),
        }
    }

    for step in 1..=job.steps {
        tokio::time::sleep(Duration::from_millis(150 * step as u64)).await;
        writeln!(out, "step {step}/{}", job.steps).map_err(|e| e.to_string())?;
    }

    if job.fails {
        return Err(format!("{} exited with status 1", job.name));
    }
    writeln!(out, "done").map_err(|e| e.to_string())
}

async fn metrics_handler(State(metrics): State<PrometheusMetrics>) -> Response {
    match metrics.encode_text() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn serve_metrics(addr: SocketAddr, metrics: PrometheusMetrics) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind metrics listener on {addr}"))?;
    info!("metrics exposed on http://{addr}/metrics");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "metrics server stopped");
        }
    });
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Logger
    let log_cfg = LoggerConfig::from_env()?;
    logger_init(&log_cfg)?;

    // 2) Coordinator + pool from env
    let cfg = CoordinatorConfig::from_env()?;
    let keys = credential_keys_from_env()?;
    let metrics = PrometheusMetrics::new()?;

    let mut coordinator =
        WorkCoordinator::new(cfg).with_metrics(Arc::new(metrics.clone()));
    if !keys.is_empty() {
        let pool = CredentialPool::new(&keys).context("build credential pool")?;
        info!(credentials = pool.len(), "credential pool ready");
        coordinator = coordinator.with_pool(Arc::new(pool));
    } else {
        info!("no credentials configured; running without a pool");
    }

    if let Ok(raw) = std::env::var(ENV_METRICS_ADDR) {
        let addr: SocketAddr = raw
            .parse()
            .with_context(|| format!("{ENV_METRICS_ADDR}={raw:?}"))?;
        serve_metrics(addr, metrics.clone()).await?;
    }

    // 3) Work items, narrowed to a previous run's leftovers when resuming
    let count = match std::env::var(ENV_ITEMS) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .with_context(|| format!("{ENV_ITEMS}={raw:?}"))?,
        Err(_) => DEFAULT_ITEMS,
    };
    let mut jobs = Job::generate(count);

    let store = std::env::var(ENV_CHECKPOINT_DIR).ok().map(CheckpointStore::new);
    if let Some(store) = &store {
        let pending: HashSet<String> = store
            .pending_ids()?
            .into_iter()
            .map(String::from)
            .collect();
        if !pending.is_empty() {
            info!(
                dir = %store.dir().display(),
                pending = pending.len(),
                "resuming from checkpoints"
            );
            jobs.retain(|job| pending.contains(&job.name));
        }
    }

    // 4) Run
    let dry_run = std::env::args().any(|a| a == "--dry-run");
    let report = coordinator
        .execute_parallel(jobs, run_job, |job: &Job| job.name.clone(), dry_run)
        .await?;
    log_report(&report);

    // 5) Checkpoints
    if let Some(store) = &store {
        for done in report.results.iter().filter(|r| r.success) {
            store.remove(done.id.as_str())?;
        }
        if report.interrupted {
            store.save_all(&report.checkpoints)?;
            info!(
                dir = %store.dir().display(),
                saved = report.checkpoints.len(),
                "checkpoints written; rerun to resume"
            );
        }
    } else if report.interrupted && !report.checkpoints.is_empty() {
        warn!(
            unfinished = report.checkpoints.len(),
            "interrupted without {ENV_CHECKPOINT_DIR}; unfinished items are not persisted"
        );
    }

    // 6) Final metrics snapshot
    if !dry_run {
        print!("{}", metrics.encode_text()?);
    }

    Ok(())
}
