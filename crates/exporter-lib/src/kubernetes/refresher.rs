//! Background task that rebuilds the correlation cache on demand

use super::mapper::KubeResourcesMapper;
use crate::health::{components, HealthRegistry};
use crate::observability::{ExporterMetrics, StructuredLogger};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Wakes the refresher. At most one refresh is ever pending.
#[derive(Debug, Clone)]
pub struct RefreshTrigger {
    tx: mpsc::Sender<()>,
}

impl RefreshTrigger {
    /// Request a refresh; returns false when one is already pending
    pub fn trigger(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

/// Everything the refresher reports to besides the cache itself
#[derive(Clone)]
pub struct RefreshReporting {
    pub health: HealthRegistry,
    pub metrics: ExporterMetrics,
    pub logger: StructuredLogger,
}

/// Spawn the refresher; it runs until `shutdown` fires or every trigger is dropped
pub fn spawn_refresher(
    mapper: Arc<KubeResourcesMapper>,
    reporting: RefreshReporting,
    mut shutdown: broadcast::Receiver<()>,
) -> (RefreshTrigger, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(1);

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                received = rx.recv() => {
                    if received.is_none() {
                        break;
                    }
                    // A refresh in flight is abandoned on shutdown
                    tokio::select! {
                        _ = refresh_once(&mapper, &reporting) => {}
                        _ = shutdown.recv() => {
                            info!("Shutting down resource cache refresher during refresh");
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down resource cache refresher");
                    break;
                }
            }
        }
    });

    (RefreshTrigger { tx }, handle)
}

async fn refresh_once(mapper: &KubeResourcesMapper, reporting: &RefreshReporting) {
    if !mapper.is_enabled() {
        return;
    }

    match mapper.refresh().await {
        Ok(generation) => {
            let attributed = mapper.current().attributed_devices();
            reporting.metrics.inc_cache_refreshes();
            reporting.metrics.set_attributed_devices(attributed as i64);
            reporting.health.set_healthy(components::KUBE_RESOURCES).await;
            debug!(generation = generation, attributed_devices = attributed, "Refresh complete");
            if generation == 1 {
                reporting.logger.log_refresh(Ok((generation, attributed)));
            }
        }
        Err(e) => {
            let message = e.to_string();
            reporting.metrics.inc_cache_refresh_failures();
            reporting
                .health
                .set_degraded(components::KUBE_RESOURCES, message.as_str())
                .await;
            reporting.logger.log_refresh(Err(&message));
        }
    }
}
