//! Device-to-workload correlation cache
//!
//! [`KubeResourcesMapper`] keeps one immutable [`AllocationSnapshot`] behind a
//! reader/writer lock. A refresh builds the next snapshot off-lock and swaps
//! it in; readers clone the `Arc` and never hold the lock while transforming.

use super::allocation::{AllocationEntry, CoreTopology, DeviceHandle};
use super::kubelet::{AllocationSource, ResourceBinding};
use crate::error::RefreshError;
use crate::models::{labels, Record, RecordBatch};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

pub const DEFAULT_RESOURCE_PREFIX: &str = "furiosa.ai";

/// Configuration for the correlation cache
#[derive(Debug, Clone)]
pub struct MapperConfig {
    /// When false, records pass through untouched and the kubelet is never dialed
    pub enabled: bool,
    /// Only resources whose name starts with this prefix are considered
    pub resource_prefix: String,
    pub topology: CoreTopology,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            resource_prefix: DEFAULT_RESOURCE_PREFIX.to_string(),
            topology: CoreTopology::default(),
        }
    }
}

/// Device-wise and core-wise indices built from one allocation listing
#[derive(Debug, Default)]
pub struct AllocationSnapshot {
    generation: u64,
    device_wise: HashMap<String, Vec<Arc<AllocationEntry>>>,
    core_wise: HashMap<String, HashMap<u32, Arc<AllocationEntry>>>,
}

impl AllocationSnapshot {
    /// Index every device id of every matching binding, in listing order
    pub fn build(
        bindings: &[ResourceBinding],
        resource_prefix: &str,
        topology: &CoreTopology,
    ) -> Self {
        let mut device_wise: HashMap<String, Vec<Arc<AllocationEntry>>> = HashMap::new();
        let mut core_wise: HashMap<String, HashMap<u32, Arc<AllocationEntry>>> = HashMap::new();

        let matching = bindings
            .iter()
            .filter(|binding| binding.resource_name.starts_with(resource_prefix));

        for binding in matching {
            for device_id in &binding.device_ids {
                let handle = match DeviceHandle::parse(device_id) {
                    Ok(handle) => handle,
                    Err(e) => {
                        warn!(
                            error = %e,
                            resource = %binding.resource_name,
                            workload = %binding.workload,
                            "Skipping malformed device id"
                        );
                        continue;
                    }
                };

                let device_cores = topology.cores_of(&handle.uuid);
                let entry = match AllocationEntry::new(binding.workload.clone(), &handle, device_cores) {
                    Ok(entry) => Arc::new(entry),
                    Err(e) => {
                        warn!(
                            error = %e,
                            resource = %binding.resource_name,
                            workload = %binding.workload,
                            "Skipping device id outside the device topology"
                        );
                        continue;
                    }
                };

                let cores = core_wise.entry(handle.uuid.clone()).or_default();
                for core in &entry.cores {
                    cores.insert(*core, Arc::clone(&entry));
                }
                device_wise.entry(handle.uuid).or_default().push(entry);
            }
        }

        Self {
            generation: 0,
            device_wise,
            core_wise,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_empty(&self) -> bool {
        self.device_wise.is_empty()
    }

    /// Number of devices with at least one allocation
    pub fn attributed_devices(&self) -> usize {
        self.device_wise.len()
    }

    pub fn device_entries(&self, uuid: &str) -> &[Arc<AllocationEntry>] {
        self.device_wise
            .get(uuid)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn core_entry(&self, uuid: &str, core: u32) -> Option<&AllocationEntry> {
        self.core_wise
            .get(uuid)
            .and_then(|cores| cores.get(&core))
            .map(Arc::as_ref)
    }

    pub fn device_wise(&self) -> &HashMap<String, Vec<Arc<AllocationEntry>>> {
        &self.device_wise
    }

    pub fn core_wise(&self) -> &HashMap<String, HashMap<u32, Arc<AllocationEntry>>> {
        &self.core_wise
    }

    /// Attribute a batch of records to the workloads holding their devices
    pub fn transform(&self, batch: RecordBatch, core_wise: bool) -> RecordBatch {
        let mut transformed = Vec::with_capacity(batch.len());

        for record in batch {
            if core_wise {
                transformed.push(self.attribute_core(record));
            } else {
                self.attribute_device(record, &mut transformed);
            }
        }

        transformed
    }

    fn attribute_core(&self, record: Record) -> Record {
        let entry = record
            .get_str(labels::UUID)
            .zip(record.get_str(labels::CORE).and_then(|core| core.parse::<u32>().ok()))
            .and_then(|(uuid, core)| self.core_entry(uuid, core));

        match entry {
            Some(entry) => record.attributed(&entry.workload),
            None => record,
        }
    }

    fn attribute_device(&self, record: Record, out: &mut RecordBatch) {
        let entries = record
            .get_str(labels::UUID)
            .map(|uuid| self.device_entries(uuid))
            .unwrap_or_default();

        match entries {
            [] => out.push(record),
            [entry] if entry.exclusive => out.push(slice_of(&record, entry)),
            _ => {
                // Partitioned: the card as a whole, then one series per slice
                let slices: Vec<Record> = entries.iter().map(|entry| slice_of(&record, entry)).collect();
                out.push(record);
                out.extend(slices);
            }
        }
    }
}

fn slice_of(record: &Record, entry: &AllocationEntry) -> Record {
    let mut copy = record.attributed(&entry.workload);
    copy.set(labels::CORE, entry.core_label.as_str());
    copy
}

/// The cache state observed by one collection round
#[derive(Debug, Clone)]
pub enum ResourceView {
    /// Correlation is off; transform is the identity
    Disabled,
    Snapshot(Arc<AllocationSnapshot>),
}

impl ResourceView {
    pub fn transform(&self, batch: RecordBatch, core_wise: bool) -> RecordBatch {
        match self {
            ResourceView::Disabled => batch,
            ResourceView::Snapshot(snapshot) => snapshot.transform(batch, core_wise),
        }
    }

    pub fn generation(&self) -> Option<u64> {
        match self {
            ResourceView::Disabled => None,
            ResourceView::Snapshot(snapshot) => Some(snapshot.generation()),
        }
    }
}

/// Owned correlation cache shared by the pipeline and the refresher
pub struct KubeResourcesMapper {
    config: MapperConfig,
    source: Option<Arc<dyn AllocationSource>>,
    current: RwLock<Arc<AllocationSnapshot>>,
}

impl KubeResourcesMapper {
    pub fn new(config: MapperConfig, source: Arc<dyn AllocationSource>) -> Self {
        Self {
            config,
            source: Some(source),
            current: RwLock::new(Arc::new(AllocationSnapshot::default())),
        }
    }

    /// A mapper that never attributes and never dials the kubelet
    pub fn disabled() -> Self {
        Self {
            config: MapperConfig {
                enabled: false,
                ..MapperConfig::default()
            },
            source: None,
            current: RwLock::new(Arc::new(AllocationSnapshot::default())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && self.source.is_some()
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// The latest snapshot, regardless of whether correlation is enabled
    pub fn current(&self) -> Arc<AllocationSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Pin the view for one collection round
    pub fn snapshot(&self) -> ResourceView {
        if self.is_enabled() {
            ResourceView::Snapshot(self.current())
        } else {
            ResourceView::Disabled
        }
    }

    pub fn transform(&self, batch: RecordBatch, core_wise: bool) -> RecordBatch {
        self.snapshot().transform(batch, core_wise)
    }

    /// Rebuild the cache from the allocation source.
    ///
    /// Returns the generation now in place. On error the previous snapshot is
    /// kept untouched.
    pub async fn refresh(&self) -> Result<u64, RefreshError> {
        let source = match &self.source {
            Some(source) if self.config.enabled => source,
            _ => return Ok(self.current().generation()),
        };

        let bindings = source.list_allocations().await?;
        let mut next = AllocationSnapshot::build(
            &bindings,
            &self.config.resource_prefix,
            &self.config.topology,
        );

        let generation = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            next.generation = current.generation + 1;
            let generation = next.generation;
            *current = Arc::new(next);
            generation
        };

        debug!(
            generation = generation,
            bindings = bindings.len(),
            "Resource correlation cache refreshed"
        );

        Ok(generation)
    }
}
