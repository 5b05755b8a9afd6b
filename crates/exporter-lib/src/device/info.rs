//! Device identity resolution

use super::Device;
use crate::error::DeviceError;
use crate::models::DeviceInfo;
use std::collections::BTreeSet;

/// Resolve a device handle into its stable identity.
///
/// The core set is the union of the cores reported by every device file.
pub fn resolve(device: &dyn Device) -> Result<DeviceInfo, DeviceError> {
    let info = device.info()?;
    let files = device.device_files()?;

    let cores: BTreeSet<u32> = files
        .iter()
        .flat_map(|file| file.cores.iter().copied())
        .collect();
    let cores: Vec<u32> = cores.into_iter().collect();

    let core_label = core_label(&cores).ok_or_else(|| DeviceError::NoCores {
        device: info.name.clone(),
    })?;

    Ok(DeviceInfo {
        uuid: info.uuid,
        arch: info.arch,
        name: info.name,
        bdf: info.bdf,
        firmware_version: info.firmware_version,
        pert_version: info.pert_version,
        cores,
        core_label,
    })
}

/// Render a core set as `"N"` or `"min-max"`.
///
/// Holes in the set are not represented; the span always covers min to max.
pub fn core_label(cores: &[u32]) -> Option<String> {
    let start = cores.iter().min()?;
    let end = cores.iter().max()?;

    if start == end {
        Some(start.to_string())
    } else {
        Some(format!("{}-{}", start, end))
    }
}
