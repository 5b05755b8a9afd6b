//! Error types shared across the exporter

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure reading one device or one reading family from it
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device {device}: {reading} reading unavailable")]
    Unavailable {
        device: String,
        reading: &'static str,
    },

    #[error("device {device} exposes no cores")]
    NoCores { device: String },

    #[error("failed to read device listing: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed device listing: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure rebuilding the resource correlation cache
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("kubelet socket '{}' does not exist", .0.display())]
    SocketMissing(PathBuf),

    #[error("failed to connect to '{}': {source}", .path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("failed to get pod resources: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("pod resources request timed out after {0:?}")]
    Timeout(Duration),
}

/// Malformed device plugin resource handle
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeviceIdError {
    #[error("device id '{0}' has no uuid")]
    MissingUuid(String),

    #[error("device id '{id}' has invalid core range '{cores}'")]
    InvalidCores { id: String, cores: String },

    #[error("device {uuid} does not expose cores '{cores}'")]
    OutsideTopology { uuid: String, cores: String },
}

/// One failure within a collection round
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("{collector}: {source}")]
    Device {
        collector: &'static str,
        #[source]
        source: DeviceError,
    },

    #[error("failed to list devices: {0}")]
    ListDevices(#[source] DeviceError),
}

impl CollectError {
    pub fn device(collector: &'static str, source: DeviceError) -> Self {
        Self::Device { collector, source }
    }
}

/// Errors that terminate the exporter
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("metrics server failed: {0}")]
    Server(#[from] std::io::Error),

    #[error("collection loop panicked: {0}")]
    Panicked(String),
}
