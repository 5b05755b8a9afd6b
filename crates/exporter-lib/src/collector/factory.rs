//! Base record construction

use crate::device::{resolve, Device};
use crate::error::DeviceError;
use crate::models::{labels, DeviceInfo, Record};

/// Builds device-wise records carrying node-wide identity labels
#[derive(Debug, Clone)]
pub struct MetricFactory {
    node_name: String,
    driver_version: String,
}

impl MetricFactory {
    pub fn new(node_name: impl Into<String>, driver_version: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            driver_version: driver_version.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Record with every default label present; attribution labels start empty
    pub fn record_for(&self, info: &DeviceInfo) -> Record {
        let mut record = Record::new();
        for key in labels::DEFAULT {
            record.set(key, "");
        }

        record
            .with(labels::ARCH, info.arch.as_str())
            .with(labels::CORE, info.core_label.as_str())
            .with(labels::DEVICE, info.name.as_str())
            .with(labels::UUID, info.uuid.as_str())
            .with(labels::BDF, info.bdf.as_str())
            .with(labels::FIRMWARE_VERSION, info.firmware_version.as_str())
            .with(labels::PERT_VERSION, info.pert_version.as_str())
            .with(labels::DRIVER_VERSION, self.driver_version.as_str())
            .with(labels::HOSTNAME, self.node_name.as_str())
    }

    /// Resolve `device` and build its device-wise record
    pub fn device_record(&self, device: &dyn Device) -> Result<Record, DeviceError> {
        let info = resolve(device)?;
        Ok(self.record_for(&info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_carries_identity_and_empty_attribution() {
        let info = DeviceInfo {
            uuid: "u1".to_string(),
            arch: "rngd".to_string(),
            name: "npu0".to_string(),
            bdf: "0000:17:00.0".to_string(),
            firmware_version: "1.2.0".to_string(),
            pert_version: "0.9.1".to_string(),
            cores: (0..8).collect(),
            core_label: "0-7".to_string(),
        };

        let record = MetricFactory::new("node-a", "2024.1.0").record_for(&info);

        for key in labels::DEFAULT {
            assert!(record.contains(key), "missing {}", key);
        }
        assert_eq!(record.label(labels::CORE), "0-7");
        assert_eq!(record.label(labels::HOSTNAME), "node-a");
        assert_eq!(record.label(labels::DRIVER_VERSION), "2024.1.0");
        assert_eq!(record.get_str(labels::POD), Some(""));
    }
}
