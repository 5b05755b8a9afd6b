//! Device access layer
//!
//! The exporter talks to NPUs through the [`Device`] and [`DeviceReader`]
//! traits. A vendor SMI binding implements them; [`StaticDeviceReader`] and
//! [`JsonDeviceReader`] serve in-memory or file-backed device state.

mod info;
mod fixture;

pub use fixture::{DeviceListing, JsonDeviceReader, StaticDevice, StaticDeviceReader};
pub use info::{core_label, resolve};

use crate::error::DeviceError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identity reported by the device itself, before core resolution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDeviceInfo {
    pub uuid: String,
    pub arch: String,
    pub name: String,
    pub bdf: String,
    pub firmware_version: String,
    pub pert_version: String,
}

/// A device node and the cores reachable through it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFile {
    pub path: String,
    pub cores: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub ambient: f64,
    pub soc_peak: f64,
}

/// Active error counts per error class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorCounters {
    pub axi_post_error: u32,
    pub axi_fetch_error: u32,
    pub axi_discard_error: u32,
    pub axi_doorbell_done: u32,
    pub pcie_post_error: u32,
    pub pcie_fetch_error: u32,
    pub pcie_discard_error: u32,
    pub pcie_doorbell_done: u32,
    pub device_error: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoreUtilization {
    pub core: u32,
    pub pe_usage_percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreFrequency {
    pub core: u32,
    /// MHz
    pub frequency: u32,
}

/// Monotonic per-core cycle counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceCounter {
    pub core: u32,
    pub task_execution_cycle: u64,
    pub cycle_count: u64,
}

/// Read access to one NPU device
pub trait Device: Send + Sync {
    fn info(&self) -> Result<RawDeviceInfo, DeviceError>;

    fn device_files(&self) -> Result<Vec<DeviceFile>, DeviceError>;

    fn liveness(&self) -> Result<bool, DeviceError>;

    /// RMS power draw in watts
    fn power_consumption(&self) -> Result<f64, DeviceError>;

    fn temperature(&self) -> Result<Temperature, DeviceError>;

    fn error_counters(&self) -> Result<ErrorCounters, DeviceError>;

    fn core_utilization(&self) -> Result<Vec<CoreUtilization>, DeviceError>;

    fn core_frequency(&self) -> Result<Vec<CoreFrequency>, DeviceError>;

    fn performance_counters(&self) -> Result<Vec<PerformanceCounter>, DeviceError>;
}

/// Enumerates the devices present on the node
pub trait DeviceReader: Send + Sync {
    fn list_devices(&self) -> Result<Vec<Arc<dyn Device>>, DeviceError>;

    fn driver_version(&self) -> Result<String, DeviceError>;
}
