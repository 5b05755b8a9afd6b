//! Device temperature, ambient and SoC peak under one metric name

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

const AMBIENT: &str = "ambient";
const PEAK: &str = "peak";

pub struct TemperatureCollector {
    factory: Arc<MetricFactory>,
    gauge: GaugeVec,
    keys: Vec<&'static str>,
}

impl TemperatureCollector {
    pub fn new(factory: Arc<MetricFactory>) -> prometheus::Result<Self> {
        let keys = labels::with_discriminator();
        let gauge = GaugeVec::new(
            Opts::new(
                "furiosa_npu_hw_temperature",
                "The current temperature of NPU device",
            ),
            &keys,
        )?;
        Ok(Self {
            factory,
            gauge,
            keys,
        })
    }
}

impl Collector for TemperatureCollector {
    fn name(&self) -> &'static str {
        "temperature"
    }

    fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(LabelFilterCollector::new(self.gauge.clone())))
    }

    fn sample(&self, devices: &[Arc<dyn Device>]) -> (RecordBatch, Vec<CollectError>) {
        sample_devices(self.name(), &self.factory, devices, |device, base, batch| {
            let temperature = device.temperature()?;
            batch.push(
                base.clone()
                    .with(labels::LABEL, AMBIENT)
                    .with(AMBIENT, temperature.ambient),
            );
            batch.push(base.with(labels::LABEL, PEAK).with(PEAK, temperature.soc_peak));
            Ok(())
        })
    }

    fn post_process(&self, batch: RecordBatch, view: &ResourceView) {
        let records = view.transform(batch, false);
        set_gauges(&self.gauge, &self.keys, &records, discriminated_value);
    }
}
