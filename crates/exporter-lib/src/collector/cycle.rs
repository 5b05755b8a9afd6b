//! Per-core cycle counters
//!
//! The device counters are monotonic; each round the counter vectors are
//! reset and set to the absolute values read. No previous values are kept.

use super::{sample_devices, set_counters, Collector, LabelFilterCollector, MetricFactory};
use crate::device::Device;
use crate::error::CollectError;
use crate::kubernetes::ResourceView;
use crate::models::{labels, RecordBatch};
use prometheus::{CounterVec, Opts, Registry};
use std::sync::Arc;

const TASK_EXECUTION_CYCLE: &str = "task_execution_cycle";
const TOTAL_CYCLE_COUNT: &str = "total_cycle_count";

pub struct CycleCollector {
    factory: Arc<MetricFactory>,
    task_execution_cycle: CounterVec,
    total_cycle_count: CounterVec,
}

impl CycleCollector {
    pub fn new(factory: Arc<MetricFactory>) -> prometheus::Result<Self> {
        let task_execution_cycle = CounterVec::new(
            Opts::new(
                "furiosa_npu_task_execution_cycle",
                "The current task execution cycle of NPU device",
            ),
            &labels::DEFAULT,
        )?;
        let total_cycle_count = CounterVec::new(
            Opts::new(
                "furiosa_npu_total_cycle_count",
                "The current total cycle count of NPU device",
            ),
            &labels::DEFAULT,
        )?;

        Ok(Self {
            factory,
            task_execution_cycle,
            total_cycle_count,
        })
    }
}

impl Collector for CycleCollector {
    fn name(&self) -> &'static str {
        "cycle"
    }

    fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(LabelFilterCollector::new(
            self.task_execution_cycle.clone(),
        )))?;
        registry.register(Box::new(LabelFilterCollector::new(
            self.total_cycle_count.clone(),
        )))
    }

    fn sample(&self, devices: &[Arc<dyn Device>]) -> (RecordBatch, Vec<CollectError>) {
        sample_devices(self.name(), &self.factory, devices, |device, base, batch| {
            let counters = device.performance_counters()?;
            batch.extend(counters.into_iter().map(|counter| {
                base.clone()
                    .with(labels::CORE, counter.core.to_string())
                    .with(TASK_EXECUTION_CYCLE, counter.task_execution_cycle)
                    .with(TOTAL_CYCLE_COUNT, counter.cycle_count)
            }));
            Ok(())
        })
    }

    fn post_process(&self, batch: RecordBatch, view: &ResourceView) {
        let records = view.transform(batch, true);

        set_counters(&self.task_execution_cycle, &labels::DEFAULT, &records, |record| {
            record.get_f64(TASK_EXECUTION_CYCLE)
        });
        set_counters(&self.total_cycle_count, &labels::DEFAULT, &records, |record| {
            record.get_f64(TOTAL_CYCLE_COUNT)
        });
    }
}
