//! Prometheus metrics backend for fanout runs.
//!
//! [`PrometheusMetrics`] implements [`fanout_core::MetricsBackend`] over its own
//! [`Registry`], so several coordinators (or tests) never collide on global state.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use fanout_core::{CoordinatorConfig, WorkCoordinator};
//! use fanout_prometheus::PrometheusMetrics;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::new()?;
//! let coordinator = WorkCoordinator::new(CoordinatorConfig::default())
//!     .with_metrics(Arc::new(metrics.clone()));
//! # let _ = coordinator;
//!
//! // Later, e.g. from a /metrics handler:
//! let body = metrics.encode_text()?;
//! assert!(body.contains("fanout_items_started_total"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `fanout_items_started_total` - Counter
//! - `fanout_items_completed_total{outcome}` - Counter
//! - `fanout_items_checkpointed_total` - Counter
//! - `fanout_item_duration_seconds` - Histogram
//! - `fanout_credential_wait_seconds{outcome}` - Histogram
//! - `fanout_credentials_rate_limited_total` - Counter
//!
//! This crate does NOT serve HTTP; hand [`PrometheusMetrics::encode_text`] to whatever
//! server the application already runs.

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
