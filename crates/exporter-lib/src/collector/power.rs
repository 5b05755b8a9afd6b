//! Device power draw

use super::{
    discriminated_value, sample_devices, set_gauges, Collector, LabelFilterCollector,
    MetricFactory,
};
use crate::device::Device;
use crate::error::CollectError;
use crate::kubernetes::ResourceView;
use crate::models::{labels, RecordBatch};
use prometheus::{GaugeVec, Opts, Registry};
use std::sync::Arc;

const RMS: &str = "rms";

pub struct PowerCollector {
    factory: Arc<MetricFactory>,
    gauge: GaugeVec,
    keys: Vec<&'static str>,
}

impl PowerCollector {
    pub fn new(factory: Arc<MetricFactory>) -> prometheus::Result<Self> {
        let keys = labels::with_discriminator();
        let gauge = GaugeVec::new(
            Opts::new("furiosa_npu_hw_power", "The current power of NPU device"),
            &keys,
        )?;
        Ok(Self {
            factory,
            gauge,
            keys,
        })
    }
}

impl Collector for PowerCollector {
    fn name(&self) -> &'static str {
        "power"
    }

    fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(LabelFilterCollector::new(self.gauge.clone())))
    }

    fn sample(&self, devices: &[Arc<dyn Device>]) -> (RecordBatch, Vec<CollectError>) {
        sample_devices(self.name(), &self.factory, devices, |device, base, batch| {
            let watts = device.power_consumption()?;
            batch.push(base.with(labels::LABEL, RMS).with(RMS, watts));
            Ok(())
        })
    }

    fn post_process(&self, batch: RecordBatch, view: &ResourceView) {
        let records = view.transform(batch, false);
        set_gauges(&self.gauge, &self.keys, &records, discriminated_value);
    }
}
