//! NPU metric samplers
//!
//! One [`Collector`] per metric family. Each round a sampler reads its
//! readings from every device into a [`RecordBatch`], passes the batch through
//! the pinned [`ResourceView`], then replaces the contents of its metric
//! vectors. Vectors are registered through [`LabelFilterCollector`] so empty
//! attribution labels never reach the exposition.

mod cycle;
mod errors;
mod factory;
mod frequency;
mod liveness;
mod power;
mod publisher;
mod temperature;
mod utilization;

#[cfg(test)]
mod tests;

pub use cycle::CycleCollector;
pub use errors::ErrorCollector;
pub use factory::MetricFactory;
pub use frequency::FrequencyCollector;
pub use liveness::LivenessCollector;
pub use power::PowerCollector;
pub use publisher::LabelFilterCollector;
pub use temperature::TemperatureCollector;
pub use utilization::CoreUtilizationCollector;

use crate::device::Device;
use crate::error::{CollectError, DeviceError};
use crate::kubernetes::ResourceView;
use crate::models::{Record, RecordBatch};
use prometheus::{CounterVec, GaugeVec, Registry};
use std::sync::Arc;

/// A sampler for one metric family
pub trait Collector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Register the family's metric vectors
    fn register(&self, registry: &Registry) -> prometheus::Result<()>;

    /// Read every device; a failing device is reported and skipped
    fn sample(&self, devices: &[Arc<dyn Device>]) -> (RecordBatch, Vec<CollectError>);

    /// Attribute the batch and replace the published samples with it
    fn post_process(&self, batch: RecordBatch, view: &ResourceView);

    /// One round: sample, then publish what was gathered
    fn collect(&self, devices: &[Arc<dyn Device>], view: &ResourceView) -> Vec<CollectError> {
        let (batch, errors) = self.sample(devices);
        self.post_process(batch, view);
        errors
    }
}

/// Run `read` for every device whose identity resolves, accumulating failures.
///
/// `read` receives the device-wise base record and pushes the records it
/// derives from it. It must push nothing when it fails.
pub(crate) fn sample_devices<F>(
    collector: &'static str,
    factory: &MetricFactory,
    devices: &[Arc<dyn Device>],
    mut read: F,
) -> (RecordBatch, Vec<CollectError>)
where
    F: FnMut(&dyn Device, Record, &mut RecordBatch) -> Result<(), DeviceError>,
{
    let mut batch = Vec::with_capacity(devices.len());
    let mut errors = Vec::new();

    for device in devices {
        let result = factory
            .device_record(device.as_ref())
            .and_then(|base| read(device.as_ref(), base, &mut batch));

        if let Err(e) = result {
            errors.push(CollectError::device(collector, e));
        }
    }

    (batch, errors)
}

/// Replace every sample of `gauge` with one per record that carries a value
pub(crate) fn set_gauges<F>(gauge: &GaugeVec, keys: &[&str], records: &[Record], value: F)
where
    F: Fn(&Record) -> Option<f64>,
{
    gauge.reset();

    for record in records {
        if let Some(v) = value(record) {
            gauge.with_label_values(&record.label_values(keys)).set(v);
        }
    }
}

/// Replace every sample of `counter` with the absolute value each record carries
pub(crate) fn set_counters<F>(counter: &CounterVec, keys: &[&str], records: &[Record], value: F)
where
    F: Fn(&Record) -> Option<f64>,
{
    counter.reset();

    for record in records {
        if let Some(v) = value(record) {
            counter.with_label_values(&record.label_values(keys)).inc_by(v);
        }
    }
}

/// Value of the reading named by the record's `label` discriminator
pub(crate) fn discriminated_value(record: &Record) -> Option<f64> {
    record.get_f64(record.label(crate::models::labels::LABEL))
}
