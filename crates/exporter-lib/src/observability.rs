//! Observability infrastructure for the exporter
//!
//! Provides:
//! - Prometheus self-metrics (round latency, collection errors, cache refreshes)
//! - Structured JSON logging with tracing

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use tracing::{info, warn};

/// Default histogram buckets for round latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Exporter self-metrics, registered on the same registry as device metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct ExporterMetrics {
    round_latency_seconds: Histogram,
    collection_errors: IntCounter,
    cache_refreshes: IntCounter,
    cache_refresh_failures: IntCounter,
    devices_monitored: IntGauge,
    attributed_devices: IntGauge,
}

impl ExporterMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let metrics = Self {
            round_latency_seconds: Histogram::with_opts(
                HistogramOpts::new(
                    "furiosa_exporter_round_latency_seconds",
                    "Time spent in one collection round",
                )
                .buckets(LATENCY_BUCKETS.to_vec()),
            )?,
            collection_errors: IntCounter::new(
                "furiosa_exporter_collection_errors_total",
                "Total number of device read failures across all rounds",
            )?,
            cache_refreshes: IntCounter::new(
                "furiosa_exporter_cache_refresh_total",
                "Total number of successful resource cache refreshes",
            )?,
            cache_refresh_failures: IntCounter::new(
                "furiosa_exporter_cache_refresh_failures_total",
                "Total number of failed resource cache refreshes",
            )?,
            devices_monitored: IntGauge::new(
                "furiosa_exporter_devices_monitored",
                "Number of devices listed in the last round",
            )?,
            attributed_devices: IntGauge::new(
                "furiosa_exporter_attributed_devices",
                "Number of devices allocated to at least one workload",
            )?,
        };

        registry.register(Box::new(metrics.round_latency_seconds.clone()))?;
        registry.register(Box::new(metrics.collection_errors.clone()))?;
        registry.register(Box::new(metrics.cache_refreshes.clone()))?;
        registry.register(Box::new(metrics.cache_refresh_failures.clone()))?;
        registry.register(Box::new(metrics.devices_monitored.clone()))?;
        registry.register(Box::new(metrics.attributed_devices.clone()))?;

        Ok(metrics)
    }

    pub fn observe_round_latency(&self, duration_secs: f64) {
        self.round_latency_seconds.observe(duration_secs);
    }

    pub fn inc_collection_errors(&self, count: u64) {
        self.collection_errors.inc_by(count);
    }

    pub fn inc_cache_refreshes(&self) {
        self.cache_refreshes.inc();
    }

    pub fn inc_cache_refresh_failures(&self) {
        self.cache_refresh_failures.inc();
    }

    pub fn set_devices_monitored(&self, count: i64) {
        self.devices_monitored.set(count);
    }

    pub fn set_attributed_devices(&self, count: i64) {
        self.attributed_devices.set(count);
    }
}

/// Structured logger for exporter lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Log exporter startup
    pub fn log_startup(&self, version: &str, devices: usize, kube_resources: bool) {
        info!(
            event = "exporter_started",
            node = %self.node_name,
            exporter_version = %version,
            devices = devices,
            kube_resources = kube_resources,
            "Metrics exporter started"
        );
    }

    /// Log exporter shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "exporter_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Metrics exporter shutting down"
        );
    }

    /// Log the outcome of a resource cache refresh
    pub fn log_refresh(&self, result: Result<(u64, usize), &str>) {
        match result {
            Ok((generation, attributed_devices)) => {
                info!(
                    event = "kube_resources_refreshed",
                    node = %self.node_name,
                    generation = generation,
                    attributed_devices = attributed_devices,
                    "Resource correlation cache refreshed"
                );
            }
            Err(error) => {
                warn!(
                    event = "kube_resources_refresh_failed",
                    node = %self.node_name,
                    error = %error,
                    "Resource correlation cache refresh failed, keeping previous snapshot"
                );
            }
        }
    }
}
