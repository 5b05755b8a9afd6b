//! Periodic collection loop
//!
//! The round loop runs in its own task. A supervisor task awaits it and turns
//! a panic into [`ExporterError::Panicked`] on the fatal error channel.

use crate::error::{CollectError, ExporterError};
use crate::health::{components, HealthRegistry};
use crate::kubernetes::RefreshTrigger;
use crate::observability::ExporterMetrics;
use crate::pipeline::Pipeline;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Consecutive rounds without a device listing before the pipeline is unhealthy
pub const UNHEALTHY_AFTER_LISTING_FAILURES: u32 = 3;

pub struct Exporter {
    pipeline: Arc<Pipeline>,
    trigger: Option<RefreshTrigger>,
    health: HealthRegistry,
    metrics: ExporterMetrics,
    interval: Duration,
    listing_failures: u32,
}

impl Exporter {
    pub fn new(pipeline: Arc<Pipeline>, health: HealthRegistry, metrics: ExporterMetrics) -> Self {
        Self {
            pipeline,
            trigger: None,
            health,
            metrics,
            interval: DEFAULT_INTERVAL,
            listing_failures: 0,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Wake the cache refresher at the start of every round
    pub fn refresh_trigger(mut self, trigger: RefreshTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Start the round loop and its supervisor.
    ///
    /// The returned handle completes once the loop has stopped.
    pub fn start(
        self,
        shutdown: broadcast::Receiver<()>,
        fatal: mpsc::Sender<ExporterError>,
    ) -> JoinHandle<()> {
        let round_loop = tokio::spawn(self.run(shutdown));

        tokio::spawn(async move {
            match round_loop.await {
                Ok(()) => debug!("Collection loop stopped"),
                Err(e) if e.is_panic() => {
                    let message = panic_message(e.into_panic());
                    error!(error = %message, "Collection loop panicked");
                    if fatal.send(ExporterError::Panicked(message)).await.is_err() {
                        warn!("Fatal error channel closed");
                    }
                }
                Err(e) => debug!(error = %e, "Collection loop cancelled"),
            }
        })
    }

    async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs_f64(),
            collectors = ?self.pipeline.collector_names(),
            "Starting collection loop"
        );

        self.health.register(components::PIPELINE).await;

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.round().await,
                _ = shutdown.recv() => {
                    info!("Shutting down collection loop");
                    break;
                }
            }
        }
    }

    async fn round(&mut self) {
        if let Some(trigger) = &self.trigger {
            if !trigger.trigger() {
                debug!("Resource cache refresh already pending");
            }
        }

        let start = Instant::now();
        let report = self.pipeline.collect_round().await;
        let elapsed = start.elapsed();

        self.metrics.observe_round_latency(elapsed.as_secs_f64());
        self.metrics.set_devices_monitored(report.devices as i64);
        self.metrics.inc_collection_errors(report.errors.len() as u64);

        for e in &report.errors {
            warn!(error = %e, "Collection error");
        }

        let listing_failed = report
            .errors
            .iter()
            .any(|e| matches!(e, CollectError::ListDevices(_)));
        self.listing_failures = if listing_failed {
            self.listing_failures + 1
        } else {
            0
        };

        if self.listing_failures >= UNHEALTHY_AFTER_LISTING_FAILURES {
            self.health
                .set_unhealthy(
                    components::PIPELINE,
                    format!("device listing failed {} rounds in a row", self.listing_failures),
                )
                .await;
        } else if report.errors.is_empty() {
            self.health.set_healthy(components::PIPELINE).await;
        } else {
            self.health
                .set_degraded(
                    components::PIPELINE,
                    format!("{} errors in last round", report.errors.len()),
                )
                .await;
        }

        if !self.health.is_ready().await {
            self.health.set_ready(true).await;
            info!(devices = report.devices, "First collection round complete");
        }

        debug!(
            devices = report.devices,
            errors = report.errors.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Round complete"
        );
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
