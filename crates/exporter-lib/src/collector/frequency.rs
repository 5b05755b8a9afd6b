//! Per-core clock frequency

use super::{sample_devices, set_gauges, Collector, LabelFilterCollector, MetricFactory};
use crate::device::Device;
use crate::error::CollectError;
use crate::kubernetes::ResourceView;
use crate::models::{labels, RecordBatch};
use prometheus::{GaugeVec, Opts, Registry};
use std::sync::Arc;

const CORE_FREQUENCY: &str = "core_frequency";

pub struct FrequencyCollector {
    factory: Arc<MetricFactory>,
    gauge: GaugeVec,
}

impl FrequencyCollector {
    pub fn new(factory: Arc<MetricFactory>) -> prometheus::Result<Self> {
        let gauge = GaugeVec::new(
            Opts::new(
                "furiosa_npu_core_frequency",
                "The current core frequency of NPU device (MHz)",
            ),
            &labels::DEFAULT,
        )?;
        Ok(Self { factory, gauge })
    }
}

impl Collector for FrequencyCollector {
    fn name(&self) -> &'static str {
        CORE_FREQUENCY
    }

    fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(LabelFilterCollector::new(self.gauge.clone())))
    }

    fn sample(&self, devices: &[Arc<dyn Device>]) -> (RecordBatch, Vec<CollectError>) {
        sample_devices(CORE_FREQUENCY, &self.factory, devices, |device, base, batch| {
            let cores = device.core_frequency()?;
            batch.extend(cores.into_iter().map(|reading| {
                base.clone()
                    .with(labels::CORE, reading.core.to_string())
                    .with(CORE_FREQUENCY, reading.frequency)
            }));
            Ok(())
        })
    }

    fn post_process(&self, batch: RecordBatch, view: &ResourceView) {
        let records = view.transform(batch, true);
        set_gauges(&self.gauge, &labels::DEFAULT, &records, |record| {
            record.get_f64(CORE_FREQUENCY)
        });
    }
}
