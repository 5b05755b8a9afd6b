//! Per-core PE utilization

use super::{sample_devices, set_gauges, Collector, LabelFilterCollector, MetricFactory};
use crate::device::Device;
use crate::error::CollectError;
use crate::kubernetes::ResourceView;
use crate::models::{labels, RecordBatch};
use prometheus::{GaugeVec, Opts, Registry};
use std::sync::Arc;

const CORE_UTILIZATION: &str = "core_utilization";

pub struct CoreUtilizationCollector {
    factory: Arc<MetricFactory>,
    gauge: GaugeVec,
}

impl CoreUtilizationCollector {
    pub fn new(factory: Arc<MetricFactory>) -> prometheus::Result<Self> {
        let gauge = GaugeVec::new(
            Opts::new(
                "furiosa_npu_core_utilization",
                "The current core utilization of NPU device",
            ),
            &labels::DEFAULT,
        )?;
        Ok(Self { factory, gauge })
    }
}

impl Collector for CoreUtilizationCollector {
    fn name(&self) -> &'static str {
        CORE_UTILIZATION
    }

    fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(LabelFilterCollector::new(self.gauge.clone())))
    }

    fn sample(&self, devices: &[Arc<dyn Device>]) -> (RecordBatch, Vec<CollectError>) {
        sample_devices(CORE_UTILIZATION, &self.factory, devices, |device, base, batch| {
            let cores = device.core_utilization()?;
            batch.extend(cores.into_iter().map(|reading| {
                base.clone()
                    .with(labels::CORE, reading.core.to_string())
                    .with(CORE_UTILIZATION, reading.pe_usage_percentage)
            }));
            Ok(())
        })
    }

    fn post_process(&self, batch: RecordBatch, view: &ResourceView) {
        let records = view.transform(batch, true);
        set_gauges(&self.gauge, &labels::DEFAULT, &records, |record| {
            record.get_f64(CORE_UTILIZATION)
        });
    }
}
