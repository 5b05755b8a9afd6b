//! Device liveness

use super::{sample_devices, set_gauges, Collector, LabelFilterCollector, MetricFactory};
use crate::device::Device;
use crate::error::CollectError;
use crate::kubernetes::ResourceView;
use crate::models::{labels, RecordBatch};
use prometheus::{GaugeVec, Opts, Registry};
use std::sync::Arc;

const LIVENESS: &str = "liveness";

pub struct LivenessCollector {
    factory: Arc<MetricFactory>,
    gauge: GaugeVec,
}

impl LivenessCollector {
    pub fn new(factory: Arc<MetricFactory>) -> prometheus::Result<Self> {
        let gauge = GaugeVec::new(
            Opts::new("furiosa_npu_alive", "The liveness of NPU device"),
            &labels::DEFAULT,
        )?;
        Ok(Self { factory, gauge })
    }
}

impl Collector for LivenessCollector {
    fn name(&self) -> &'static str {
        LIVENESS
    }

    fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(LabelFilterCollector::new(self.gauge.clone())))
    }

    fn sample(&self, devices: &[Arc<dyn Device>]) -> (RecordBatch, Vec<CollectError>) {
        sample_devices(LIVENESS, &self.factory, devices, |device, base, batch| {
            let alive = device.liveness()?;
            batch.push(base.with(LIVENESS, alive));
            Ok(())
        })
    }

    fn post_process(&self, batch: RecordBatch, view: &ResourceView) {
        let records = view.transform(batch, false);
        set_gauges(&self.gauge, &labels::DEFAULT, &records, |record| {
            record.get_f64(LIVENESS)
        });
    }
}
