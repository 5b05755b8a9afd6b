//! In-memory and file-backed device readers

use super::{
    CoreFrequency, CoreUtilization, Device, DeviceFile, DeviceReader, ErrorCounters,
    PerformanceCounter, RawDeviceInfo, Temperature,
};
use crate::error::DeviceError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Device state captured as plain data. A missing reading fails like a device read error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticDevice {
    pub info: RawDeviceInfo,
    pub files: Vec<DeviceFile>,
    pub liveness: Option<bool>,
    pub power: Option<f64>,
    pub temperature: Option<Temperature>,
    pub errors: Option<ErrorCounters>,
    pub core_utilization: Option<Vec<CoreUtilization>>,
    pub core_frequency: Option<Vec<CoreFrequency>>,
    pub performance_counters: Option<Vec<PerformanceCounter>>,
}

impl StaticDevice {
    fn reading<T: Clone>(&self, value: &Option<T>, reading: &'static str) -> Result<T, DeviceError> {
        value.clone().ok_or_else(|| DeviceError::Unavailable {
            device: self.info.name.clone(),
            reading,
        })
    }
}

impl Device for StaticDevice {
    fn info(&self) -> Result<RawDeviceInfo, DeviceError> {
        Ok(self.info.clone())
    }

    fn device_files(&self) -> Result<Vec<DeviceFile>, DeviceError> {
        Ok(self.files.clone())
    }

    fn liveness(&self) -> Result<bool, DeviceError> {
        self.reading(&self.liveness, "liveness")
    }

    fn power_consumption(&self) -> Result<f64, DeviceError> {
        self.reading(&self.power, "power")
    }

    fn temperature(&self) -> Result<Temperature, DeviceError> {
        self.reading(&self.temperature, "temperature")
    }

    fn error_counters(&self) -> Result<ErrorCounters, DeviceError> {
        self.reading(&self.errors, "error")
    }

    fn core_utilization(&self) -> Result<Vec<CoreUtilization>, DeviceError> {
        self.reading(&self.core_utilization, "core utilization")
    }

    fn core_frequency(&self) -> Result<Vec<CoreFrequency>, DeviceError> {
        self.reading(&self.core_frequency, "core frequency")
    }

    fn performance_counters(&self) -> Result<Vec<PerformanceCounter>, DeviceError> {
        self.reading(&self.performance_counters, "performance counter")
    }
}

/// Document read by [`JsonDeviceReader`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceListing {
    pub driver_version: String,
    pub devices: Vec<StaticDevice>,
}

/// Reader over a fixed set of devices
#[derive(Clone, Default)]
pub struct StaticDeviceReader {
    driver_version: String,
    devices: Vec<Arc<dyn Device>>,
}

impl StaticDeviceReader {
    pub fn new(driver_version: impl Into<String>, devices: Vec<Arc<dyn Device>>) -> Self {
        Self {
            driver_version: driver_version.into(),
            devices,
        }
    }

    pub fn from_listing(listing: DeviceListing) -> Self {
        let devices = listing
            .devices
            .into_iter()
            .map(|d| Arc::new(d) as Arc<dyn Device>)
            .collect();
        Self::new(listing.driver_version, devices)
    }
}

impl DeviceReader for StaticDeviceReader {
    fn list_devices(&self) -> Result<Vec<Arc<dyn Device>>, DeviceError> {
        Ok(self.devices.clone())
    }

    fn driver_version(&self) -> Result<String, DeviceError> {
        Ok(self.driver_version.clone())
    }
}

/// Reader over a JSON device listing, re-read on every call so an external
/// SMI dump can refresh it between rounds
#[derive(Debug, Clone)]
pub struct JsonDeviceReader {
    path: PathBuf,
}

impl JsonDeviceReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<DeviceListing, DeviceError> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl DeviceReader for JsonDeviceReader {
    fn list_devices(&self) -> Result<Vec<Arc<dyn Device>>, DeviceError> {
        StaticDeviceReader::from_listing(self.load()?).list_devices()
    }

    fn driver_version(&self) -> Result<String, DeviceError> {
        Ok(self.load()?.driver_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const LISTING: &str = r#"{
        "driver_version": "2024.1.0",
        "devices": [
            {
                "info": {"uuid": "u1", "arch": "rngd", "name": "npu0", "bdf": "0000:17:00.0"},
                "files": [{"path": "/dev/rngd/npu0", "cores": [0, 1, 2, 3, 4, 5, 6, 7]}],
                "liveness": true,
                "power": 41.5,
                "temperature": {"ambient": 35.0, "soc_peak": 39.5}
            }
        ]
    }"#;

    #[test]
    fn test_missing_reading_is_unavailable() {
        let device = StaticDevice::default();
        assert!(matches!(
            device.liveness(),
            Err(DeviceError::Unavailable { reading: "liveness", .. })
        ));
    }

    #[test]
    fn test_json_reader_loads_listing() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(LISTING.as_bytes()).unwrap();

        let reader = JsonDeviceReader::new(file.path());
        assert_eq!(reader.driver_version().unwrap(), "2024.1.0");

        let devices = reader.list_devices().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].info().unwrap().uuid, "u1");
        assert!(devices[0].liveness().unwrap());
        assert_eq!(devices[0].temperature().unwrap().soc_peak, 39.5);
        assert!(devices[0].error_counters().is_err());
    }

    #[test]
    fn test_json_reader_missing_file() {
        let reader = JsonDeviceReader::new("/nonexistent/devices.json");
        assert!(matches!(reader.list_devices(), Err(DeviceError::Io(_))));
    }

    #[test]
    fn test_json_reader_malformed_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();

        let reader = JsonDeviceReader::new(file.path());
        assert!(matches!(reader.list_devices(), Err(DeviceError::Parse(_))));
    }
}
