//! Library for the Furiosa NPU metrics exporter
//!
//! This crate provides the core functionality for:
//! - Reading NPU state through the device layer traits
//! - Correlating devices with the Kubernetes workloads holding them
//! - Sampling metric families concurrently each collection round
//! - Publishing samples to a Prometheus registry without empty labels
//! - Health checks and observability

pub mod collector;
pub mod device;
pub mod error;
pub mod exporter;
pub mod health;
pub mod kubernetes;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod proto;

pub use error::{CollectError, DeviceError, ExporterError, RefreshError};
pub use exporter::Exporter;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use kubernetes::{KubeResourcesMapper, MapperConfig, ResourceView};
pub use models::*;
pub use observability::{ExporterMetrics, StructuredLogger};
pub use pipeline::{Pipeline, PipelineBuilder, RoundReport};
