//! Furiosa NPU metrics exporter
//!
//! Runs as a DaemonSet on each NPU node, sampling device state every
//! interval and serving it as Prometheus metrics, optionally labelled with
//! the pod holding each device.

use anyhow::Result;
use clap::Parser;
use exporter_lib::{
    collector::MetricFactory,
    device::{resolve, DeviceReader, JsonDeviceReader},
    health::{components, HealthRegistry},
    kubernetes::{
        spawn_refresher, CoreTopology, KubeResourcesMapper, KubeletClient, KubeletConfig,
        MapperConfig, RefreshReporting,
    },
    observability::{ExporterMetrics, StructuredLogger},
    DeviceInfo, Exporter, ExporterError, PipelineBuilder,
};
use prometheus::Registry;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = config::Cli::parse();
    let config = config::ExporterConfig::load(&cli)?;
    info!(
        node_name = %config.node_name,
        port = config.port,
        interval_secs = config.interval_secs,
        "Exporter configured"
    );

    let reader: Arc<dyn DeviceReader> = Arc::new(JsonDeviceReader::new(&config.device_file));
    let driver_version = reader.driver_version().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to read driver version");
        String::new()
    });
    let devices = startup_devices(reader.as_ref());

    let registry = Registry::new();
    let metrics = ExporterMetrics::new(&registry)?;
    let health_registry = HealthRegistry::new();
    let logger = StructuredLogger::new(&config.node_name);

    let mapper = if config.kube_resources_label {
        let client = KubeletClient::new(KubeletConfig {
            socket_path: config.kubelet_socket.clone(),
            request_timeout: config.kubelet_timeout(),
        });
        let mapper_config = MapperConfig {
            enabled: true,
            resource_prefix: config.resource_prefix.clone(),
            topology: CoreTopology::from_devices(&devices, config.default_core_count),
        };
        health_registry.register(components::KUBE_RESOURCES).await;
        Arc::new(KubeResourcesMapper::new(mapper_config, Arc::new(client)))
    } else {
        Arc::new(KubeResourcesMapper::disabled())
    };

    let factory = Arc::new(MetricFactory::new(config.node_name.clone(), driver_version));
    let pipeline = PipelineBuilder::new()
        .reader(reader)
        .mapper(mapper.clone())
        .factory(factory)
        .with_default_collectors(&registry)?
        .build()?;

    logger.log_startup(EXPORTER_VERSION, devices.len(), mapper.is_enabled());

    let (shutdown_tx, _) = broadcast::channel(1);
    let (fatal_tx, mut fatal_rx) = mpsc::channel(4);

    let mut exporter = Exporter::new(Arc::new(pipeline), health_registry.clone(), metrics.clone())
        .interval(config.interval());

    let refresher = if mapper.is_enabled() {
        let reporting = RefreshReporting {
            health: health_registry.clone(),
            metrics: metrics.clone(),
            logger: logger.clone(),
        };
        let (trigger, handle) = spawn_refresher(mapper, reporting, shutdown_tx.subscribe());
        exporter = exporter.refresh_trigger(trigger);
        Some(handle)
    } else {
        None
    };

    let exporter_handle = exporter.start(shutdown_tx.subscribe(), fatal_tx.clone());

    // Start metrics and health server
    let app_state = Arc::new(api::AppState::new(health_registry, registry));
    let api_fatal = fatal_tx;
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::serve(config.port, app_state).await {
            let _ = api_fatal.send(ExporterError::Server(e)).await;
        }
    });

    let outcome = tokio::select! {
        reason = shutdown_signal() => {
            logger.log_shutdown(reason);
            Ok(())
        }
        Some(fatal) = fatal_rx.recv() => {
            error!(error = %fatal, "Exporter failed");
            logger.log_shutdown("fatal error");
            Err(fatal.into())
        }
    };

    let _ = shutdown_tx.send(());
    if let Err(e) = exporter_handle.await {
        warn!(error = %e, "Collection loop did not stop cleanly");
    }
    if let Some(handle) = refresher {
        if let Err(e) = handle.await {
            warn!(error = %e, "Resource cache refresher did not stop cleanly");
        }
    }
    api_handle.abort();

    info!("Shutdown complete");
    outcome
}

/// Devices present at startup; their core sets seed the topology
fn startup_devices(reader: &dyn DeviceReader) -> Vec<DeviceInfo> {
    let devices = match reader.list_devices() {
        Ok(devices) => devices,
        Err(e) => {
            warn!(error = %e, "Failed to list devices at startup");
            return Vec::new();
        }
    };

    devices
        .iter()
        .filter_map(|device| match resolve(device.as_ref()) {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable device");
                None
            }
        })
        .collect()
}

#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return "SIGINT received";
        }
    };
    let mut quit = match signal(SignalKind::quit()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGQUIT handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => return "SIGINT received",
                _ = terminate.recv() => return "SIGTERM received",
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT received",
        _ = terminate.recv() => "SIGTERM received",
        _ = quit.recv() => "SIGQUIT received",
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "SIGINT received"
}
