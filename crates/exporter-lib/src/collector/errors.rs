//! Active error counts per error class

use super::{
    discriminated_value, sample_devices, set_gauges, Collector, LabelFilterCollector,
    MetricFactory,
};
use crate::device::{Device, ErrorCounters};
use crate::error::CollectError;
use crate::kubernetes::ResourceView;
use crate::models::{labels, RecordBatch};
use prometheus::{GaugeVec, Opts, Registry};
use std::sync::Arc;

fn error_classes(counters: &ErrorCounters) -> [(&'static str, u32); 9] {
    [
        ("axi_post_error", counters.axi_post_error),
        ("axi_fetch_error", counters.axi_fetch_error),
        ("axi_discard_error", counters.axi_discard_error),
        ("axi_doorbell_done", counters.axi_doorbell_done),
        ("pcie_post_error", counters.pcie_post_error),
        ("pcie_fetch_error", counters.pcie_fetch_error),
        ("pcie_discard_error", counters.pcie_discard_error),
        ("pcie_doorbell_done", counters.pcie_doorbell_done),
        ("device_error", counters.device_error),
    ]
}

pub struct ErrorCollector {
    factory: Arc<MetricFactory>,
    gauge: GaugeVec,
    keys: Vec<&'static str>,
}

impl ErrorCollector {
    pub fn new(factory: Arc<MetricFactory>) -> prometheus::Result<Self> {
        let keys = labels::with_discriminator();
        let gauge = GaugeVec::new(
            Opts::new(
                "furiosa_npu_error",
                "The current active error counts of NPU device",
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

impl Collector for ErrorCollector {
    fn name(&self) -> &'static str {
        "error"
    }

    fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(LabelFilterCollector::new(self.gauge.clone())))
    }

    fn sample(&self, devices: &[Arc<dyn Device>]) -> (RecordBatch, Vec<CollectError>) {
        sample_devices(self.name(), &self.factory, devices, |device, base, batch| {
            let counters = device.error_counters()?;
            for (class, count) in error_classes(&counters) {
                batch.push(base.clone().with(labels::LABEL, class).with(class, count));
            }
            Ok(())
        })
    }

    fn post_process(&self, batch: RecordBatch, view: &ResourceView) {
        let records = view.transform(batch, false);
        set_gauges(&self.gauge, &self.keys, &records, discriminated_value);
    }
}
