//! Device plugin resource handles and the core allocations they describe
//!
//! The device plugin advertises a whole device as `<uuid>` and a partition as
//! `<uuid>_cores_<start>[-<end>]`.

use crate::device::core_label;
use crate::error::DeviceIdError;
use crate::models::{DeviceInfo, Workload};
use std::collections::HashMap;

pub const PARTITIONED_RESOURCE_PATTERN: &str = "_cores_";

/// Cores of a device when the kubelet reports no topology for it
pub const DEFAULT_CORE_COUNT: u32 = 8;

/// Cores named by a resource handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreRange {
    /// Exclusive allocation of the whole device
    All,
    /// Inclusive range; `start == end` for a single core
    Span { start: u32, end: u32 },
}

impl CoreRange {
    fn parse(id: &str, cores: &str) -> Result<Self, DeviceIdError> {
        let invalid = || DeviceIdError::InvalidCores {
            id: id.to_string(),
            cores: cores.to_string(),
        };

        let (start, end) = match cores.split_once('-') {
            Some((start, end)) => (start, end),
            None => (cores, cores),
        };
        let start: u32 = start.parse().map_err(|_| invalid())?;
        let end: u32 = end.parse().map_err(|_| invalid())?;

        if start > end {
            return Err(invalid());
        }

        Ok(CoreRange::Span { start, end })
    }

    /// Concrete core indices given the cores the device exposes.
    ///
    /// `None` when the span names a core the device does not have.
    pub fn resolve(&self, device_cores: &[u32]) -> Option<Vec<u32>> {
        match self {
            CoreRange::All => Some(device_cores.to_vec()),
            CoreRange::Span { start, end } => {
                let cores: Vec<u32> = device_cores
                    .iter()
                    .copied()
                    .filter(|core| (*start..=*end).contains(core))
                    .collect();
                let width = u64::from(end - start) + 1;
                (cores.len() as u64 == width).then_some(cores)
            }
        }
    }
}

/// A parsed device plugin resource handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub uuid: String,
    pub cores: CoreRange,
    /// Core suffix as written after `_cores_`, published verbatim as the label
    pub suffix: Option<String>,
}

impl DeviceHandle {
    pub fn parse(device_id: &str) -> Result<Self, DeviceIdError> {
        let (uuid, cores, suffix) = match device_id.split_once(PARTITIONED_RESOURCE_PATTERN) {
            Some((uuid, cores)) => (
                uuid,
                CoreRange::parse(device_id, cores)?,
                Some(cores.to_string()),
            ),
            None => (device_id, CoreRange::All, None),
        };

        if uuid.is_empty() {
            return Err(DeviceIdError::MissingUuid(device_id.to_string()));
        }

        Ok(Self {
            uuid: uuid.to_string(),
            cores,
            suffix,
        })
    }

    /// Allocated core set and its label for a device exposing `device_cores`
    pub fn allocation(&self, device_cores: &[u32]) -> Result<(Vec<u32>, String), DeviceIdError> {
        let outside = || DeviceIdError::OutsideTopology {
            uuid: self.uuid.clone(),
            cores: self.suffix.clone().unwrap_or_default(),
        };

        let cores = self.cores.resolve(device_cores).ok_or_else(outside)?;
        let label = match &self.suffix {
            Some(suffix) => suffix.clone(),
            None => core_label(&cores).ok_or_else(outside)?,
        };
        Ok((cores, label))
    }
}

/// Cores exposed by each device, used to expand exclusive allocations
#[derive(Debug, Clone)]
pub struct CoreTopology {
    devices: HashMap<String, Vec<u32>>,
    default_cores: Vec<u32>,
}

impl Default for CoreTopology {
    fn default() -> Self {
        Self::new(DEFAULT_CORE_COUNT)
    }
}

impl CoreTopology {
    pub fn new(default_core_count: u32) -> Self {
        Self {
            devices: HashMap::new(),
            default_cores: (0..default_core_count).collect(),
        }
    }

    pub fn from_devices(devices: &[DeviceInfo], default_core_count: u32) -> Self {
        devices.iter().fold(Self::new(default_core_count), |topology, info| {
            topology.with_device(info.uuid.clone(), info.cores.clone())
        })
    }

    pub fn with_device(mut self, uuid: impl Into<String>, cores: Vec<u32>) -> Self {
        self.devices.insert(uuid.into(), cores);
        self
    }

    pub fn cores_of(&self, uuid: &str) -> &[u32] {
        self.devices
            .get(uuid)
            .map(Vec::as_slice)
            .unwrap_or(&self.default_cores)
    }
}

/// One workload's hold on a device, or a slice of it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationEntry {
    pub workload: Workload,
    pub cores: Vec<u32>,
    pub core_label: String,
    /// The allocation covers every core of the device
    pub exclusive: bool,
}

impl AllocationEntry {
    pub fn new(
        workload: Workload,
        handle: &DeviceHandle,
        device_cores: &[u32],
    ) -> Result<Self, DeviceIdError> {
        let (cores, core_label) = handle.allocation(device_cores)?;
        let exclusive = device_cores.iter().all(|core| cores.contains(core));

        Ok(Self {
            workload,
            cores,
            core_label,
            exclusive,
        })
    }
}
