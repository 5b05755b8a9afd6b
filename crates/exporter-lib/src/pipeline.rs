//! Collection round orchestration
//!
//! A round lists devices once, pins one view of the correlation cache and
//! runs every sampler concurrently on the blocking pool. Errors from all
//! samplers are gathered; one failing sampler never stops the others.

use crate::collector::{
    Collector, CoreUtilizationCollector, CycleCollector, ErrorCollector, FrequencyCollector,
    LivenessCollector, MetricFactory, PowerCollector, TemperatureCollector,
};
use crate::device::{Device, DeviceReader};
use crate::error::CollectError;
use crate::kubernetes::KubeResourcesMapper;
use anyhow::Result;
use prometheus::Registry;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Outcome of one collection round
#[derive(Debug, Default)]
pub struct RoundReport {
    /// Devices listed at the start of the round
    pub devices: usize,
    /// Cache generation every sampler observed; `None` when correlation is off
    pub generation: Option<u64>,
    pub errors: Vec<CollectError>,
}

pub struct Pipeline {
    reader: Arc<dyn DeviceReader>,
    mapper: Arc<KubeResourcesMapper>,
    collectors: Vec<Arc<dyn Collector>>,
}

impl Pipeline {
    pub fn mapper(&self) -> &Arc<KubeResourcesMapper> {
        &self.mapper
    }

    pub fn collector_names(&self) -> Vec<&'static str> {
        self.collectors.iter().map(|c| c.name()).collect()
    }

    /// Run one round and return every error it produced
    pub async fn collect(&self) -> Vec<CollectError> {
        self.collect_round().await.errors
    }

    /// Run one round.
    ///
    /// A sampler panic is resumed on the caller only after every sampler
    /// has finished.
    pub async fn collect_round(&self) -> RoundReport {
        let reader = self.reader.clone();
        let listed = match tokio::task::spawn_blocking(move || reader.list_devices()).await {
            Ok(listed) => listed,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                warn!(error = %e, "Device listing task cancelled");
                return RoundReport::default();
            }
        };

        let devices: Arc<[Arc<dyn Device>]> = match listed {
            Ok(devices) => devices.into(),
            Err(e) => {
                return RoundReport {
                    errors: vec![CollectError::ListDevices(e)],
                    ..RoundReport::default()
                }
            }
        };

        let view = self.mapper.snapshot();
        let mut tasks = JoinSet::new();

        for (index, collector) in self.collectors.iter().enumerate() {
            let collector = collector.clone();
            let devices = devices.clone();
            let view = view.clone();
            tasks.spawn_blocking(move || (index, collector.collect(&devices, &view)));
        }

        let mut per_collector = Vec::with_capacity(self.collectors.len());
        let mut panic = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => per_collector.push(result),
                Err(e) if e.is_panic() => {
                    if panic.is_none() {
                        panic = Some(e.into_panic());
                    }
                }
                Err(e) => warn!(error = %e, "Sampler task cancelled"),
            }
        }

        if let Some(payload) = panic {
            std::panic::resume_unwind(payload);
        }

        // Registration order keeps error reports reproducible
        per_collector.sort_by_key(|(index, _)| *index);
        let errors: Vec<CollectError> = per_collector
            .into_iter()
            .flat_map(|(_, errors)| errors)
            .collect();

        debug!(
            devices = devices.len(),
            errors = errors.len(),
            generation = ?view.generation(),
            "Collection round complete"
        );

        RoundReport {
            devices: devices.len(),
            generation: view.generation(),
            errors,
        }
    }
}

/// Create the seven NPU samplers and register them on `registry`
pub fn default_collectors(
    factory: Arc<MetricFactory>,
    registry: &Registry,
) -> prometheus::Result<Vec<Arc<dyn Collector>>> {
    let collectors: Vec<Arc<dyn Collector>> = vec![
        Arc::new(LivenessCollector::new(factory.clone())?),
        Arc::new(PowerCollector::new(factory.clone())?),
        Arc::new(TemperatureCollector::new(factory.clone())?),
        Arc::new(ErrorCollector::new(factory.clone())?),
        Arc::new(CoreUtilizationCollector::new(factory.clone())?),
        Arc::new(FrequencyCollector::new(factory.clone())?),
        Arc::new(CycleCollector::new(factory)?),
    ];

    for collector in &collectors {
        collector.register(registry)?;
    }

    Ok(collectors)
}

/// Builder for creating a pipeline
#[derive(Default)]
pub struct PipelineBuilder {
    reader: Option<Arc<dyn DeviceReader>>,
    mapper: Option<Arc<KubeResourcesMapper>>,
    factory: Option<Arc<MetricFactory>>,
    collectors: Vec<Arc<dyn Collector>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the device reader
    pub fn reader(mut self, reader: Arc<dyn DeviceReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Set the correlation cache; a disabled mapper is used when unset
    pub fn mapper(mut self, mapper: Arc<KubeResourcesMapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// Set the record factory used by the default samplers
    pub fn factory(mut self, factory: Arc<MetricFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Add an already registered sampler
    pub fn collector(mut self, collector: Arc<dyn Collector>) -> Self {
        self.collectors.push(collector);
        self
    }

    /// Add the seven NPU samplers, registered on `registry`
    pub fn with_default_collectors(mut self, registry: &Registry) -> Result<Self> {
        let factory = self
            .factory
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Metric factory is required for default collectors"))?;

        let collectors = default_collectors(factory, registry)
            .map_err(|e| anyhow::anyhow!("Failed to register collectors: {}", e))?;
        self.collectors.extend(collectors);
        Ok(self)
    }

    /// Build the pipeline
    pub fn build(self) -> Result<Pipeline> {
        let reader = self
            .reader
            .ok_or_else(|| anyhow::anyhow!("Device reader is required"))?;
        let mapper = self
            .mapper
            .unwrap_or_else(|| Arc::new(KubeResourcesMapper::disabled()));

        if self.collectors.is_empty() {
            anyhow::bail!("At least one collector is required");
        }

        Ok(Pipeline {
            reader,
            mapper,
            collectors: self.collectors,
        })
    }
}
