use std::time::Duration;

use fanout_core::{MetricsBackend, Outcome};
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder, proto::MetricFamily,
};

const DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0];
const WAIT_BUCKETS: &[f64] = &[0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0];

/// Prometheus-backed [`MetricsBackend`]. Clones share the same collectors.
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    started: IntCounter,
    completed: IntCounterVec,
    checkpointed: IntCounter,
    duration: Histogram,
    credential_wait: HistogramVec,
    rate_limited: IntCounter,
}

impl PrometheusMetrics {
    /// Create collectors in a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Register the collectors in `registry`, e.g. one shared with other subsystems.
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let started = IntCounter::with_opts(Opts::new(
            "fanout_items_started_total",
            "Items whose worker was invoked",
        ))?;
        let completed = IntCounterVec::new(
            Opts::new(
                "fanout_items_completed_total",
                "Items that produced a result, by outcome",
            ),
            &["outcome"],
        )?;
        let checkpointed = IntCounter::with_opts(Opts::new(
            "fanout_items_checkpointed_total",
            "Items left for a later run because of shutdown",
        ))?;
        let duration = Histogram::with_opts(
            HistogramOpts::new(
                "fanout_item_duration_seconds",
                "Wall time from admission to result",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
        )?;
        let credential_wait = HistogramVec::new(
            HistogramOpts::new(
                "fanout_credential_wait_seconds",
                "Time spent waiting for a credential, by outcome",
            )
            .buckets(WAIT_BUCKETS.to_vec()),
            &["outcome"],
        )?;
        let rate_limited = IntCounter::with_opts(Opts::new(
            "fanout_credentials_rate_limited_total",
            "Credentials benched after a rate-limit signal",
        ))?;

        registry.register(Box::new(started.clone()))?;
        registry.register(Box::new(completed.clone()))?;
        registry.register(Box::new(checkpointed.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(credential_wait.clone()))?;
        registry.register(Box::new(rate_limited.clone()))?;

        Ok(Self {
            registry,
            started,
            completed,
            checkpointed,
            duration,
            credential_wait,
            rate_limited,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Current values in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.gather())
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn item_started(&self) {
        self.started.inc();
    }

    fn item_finished(&self, outcome: Outcome, duration: Duration) {
        self.completed
            .with_label_values(&[outcome.as_label()])
            .inc();
        self.duration.observe(duration.as_secs_f64());
    }

    fn item_checkpointed(&self) {
        self.checkpointed.inc();
    }

    fn credential_wait(&self, waited: Duration, acquired: bool) {
        let outcome = if acquired { "acquired" } else { "gave_up" };
        self.credential_wait
            .with_label_values(&[outcome])
            .observe(waited.as_secs_f64());
    }

    fn credential_rate_limited(&self) {
        self.rate_limited.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use fanout_core::{
        CoordinatorConfig, CredentialPool, OutputMultiplexer, WorkContext, WorkCoordinator,
    };

    /// Value of one exposed series, `0.0` when absent.
    fn sample(m: &PrometheusMetrics, series: &str) -> f64 {
        m.encode_text()
            .unwrap()
            .lines()
            .filter_map(|l| l.strip_prefix(series))
            .find_map(|rest| rest.strip_prefix(' '))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0.0)
    }

    #[test]
    fn hooks_update_collectors() {
        let m = PrometheusMetrics::new().unwrap();
        m.item_started();
        m.item_started();
        m.item_finished(Outcome::Success, Duration::from_millis(20));
        m.item_finished(Outcome::CredentialUnavailable, Duration::from_secs(1));
        m.item_checkpointed();
        m.credential_wait(Duration::from_millis(5), true);
        m.credential_rate_limited();

        assert_eq!(sample(&m, "fanout_items_started_total"), 2.0);
        assert_eq!(
            sample(&m, r#"fanout_items_completed_total{outcome="success"}"#),
            1.0
        );
        assert_eq!(
            sample(
                &m,
                r#"fanout_items_completed_total{outcome="credential_unavailable"}"#
            ),
            1.0
        );
        assert_eq!(sample(&m, "fanout_items_checkpointed_total"), 1.0);
        assert_eq!(sample(&m, "fanout_credentials_rate_limited_total"), 1.0);

        assert_eq!(sample(&m, "fanout_item_duration_seconds_count"), 2.0);
        assert_eq!(
            sample(&m, r#"fanout_credential_wait_seconds_count{outcome="acquired"}"#),
            1.0
        );
    }

    #[test]
    fn separate_instances_do_not_collide() {
        let a = PrometheusMetrics::new().unwrap();
        let b = PrometheusMetrics::new().unwrap();
        a.item_started();
        assert_eq!(sample(&a, "fanout_items_started_total"), 1.0);
        assert_eq!(sample(&b, "fanout_items_started_total"), 0.0);
    }

    #[test]
    fn shared_registry_rejects_double_registration() {
        let registry = Registry::new();
        PrometheusMetrics::with_registry(registry.clone()).unwrap();
        assert!(PrometheusMetrics::with_registry(registry).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn counts_a_real_run() {
        let metrics = PrometheusMetrics::new().unwrap();
        let pool = Arc::new(CredentialPool::new(["k1", "k2"]).unwrap());
        let coordinator = WorkCoordinator::new(CoordinatorConfig {
            handle_signals: false,
            ..CoordinatorConfig::default()
        })
        .with_pool(pool)
        .with_output(Arc::new(OutputMultiplexer::new(std::io::sink())))
        .with_metrics(Arc::new(metrics.clone()));

        let items: Vec<u32> = (0..6).collect();
        let report = coordinator
            .execute_parallel(
                items,
                |n: u32, _ctx: WorkContext| async move {
                    if n == 3 { Err("odd one out") } else { Ok(()) }
                },
                |n| format!("n{n}"),
                false,
            )
            .await
            .unwrap();

        assert_eq!(report.stats.completed, 6);
        assert_eq!(sample(&metrics, "fanout_items_started_total"), 6.0);
        assert_eq!(
            sample(&metrics, r#"fanout_items_completed_total{outcome="success"}"#),
            5.0
        );
        assert_eq!(
            sample(&metrics, r#"fanout_items_completed_total{outcome="failure"}"#),
            1.0
        );
    }
}
