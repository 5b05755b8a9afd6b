//! Core data models for the exporter

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Record field names. Identity and attribution fields double as Prometheus label names.
pub mod labels {
    pub const ARCH: &str = "arch";
    pub const CORE: &str = "core";
    pub const DEVICE: &str = "device";
    pub const UUID: &str = "uuid";
    pub const BDF: &str = "pci_bus_id";
    pub const FIRMWARE_VERSION: &str = "firmware_version";
    pub const PERT_VERSION: &str = "pert_version";
    pub const DRIVER_VERSION: &str = "driver_version";
    pub const HOSTNAME: &str = "hostname";
    pub const NAMESPACE: &str = "namespace";
    pub const POD: &str = "pod";
    pub const CONTAINER: &str = "container";

    /// Discriminator for families that expose several readings under one metric name
    pub const LABEL: &str = "label";

    /// Label set shared by every device metric family
    pub const DEFAULT: [&str; 12] = [
        ARCH,
        CORE,
        DEVICE,
        UUID,
        BDF,
        FIRMWARE_VERSION,
        PERT_VERSION,
        DRIVER_VERSION,
        HOSTNAME,
        NAMESPACE,
        POD,
        CONTAINER,
    ];

    /// Default label set plus the `label` discriminator
    pub fn with_discriminator() -> Vec<&'static str> {
        let mut keys = DEFAULT.to_vec();
        keys.push(LABEL);
        keys
    }
}

/// A scalar carried by a record field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Bool(bool),
    Uint(u64),
    Float(f64),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view used when publishing; bools map to 1/0
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Uint(u) => Some(*u as f64),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(_) => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Uint(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Uint(u64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

/// One metric observation: identity and attribution labels plus readings.
///
/// Cloning copies every field, so duplicated records never alias each other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// Builder-style variant of [`Record::set`]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    /// String value of a label field, empty when absent or not a string
    pub fn label(&self, key: &str) -> &str {
        self.get_str(key).unwrap_or_default()
    }

    /// Values for `keys` in order, suitable for `with_label_values`
    pub fn label_values<'a>(&'a self, keys: &[&str]) -> Vec<&'a str> {
        keys.iter().map(|key| self.label(key)).collect()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy of this record attributed to `workload`
    pub fn attributed(&self, workload: &Workload) -> Record {
        let mut copied = self.clone();
        copied.set(labels::NAMESPACE, workload.namespace.as_str());
        copied.set(labels::POD, workload.pod.as_str());
        copied.set(labels::CONTAINER, workload.container.as_str());
        copied
    }
}

/// Records produced by one collector in one round
pub type RecordBatch = Vec<Record>;

/// Kubernetes workload holding a device resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Workload {
    pub namespace: String,
    pub pod: String,
    pub container: String,
}

impl Workload {
    pub fn new(
        namespace: impl Into<String>,
        pod: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container: container.into(),
        }
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.pod, self.container)
    }
}

/// Stable identity of one NPU device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub uuid: String,
    pub arch: String,
    pub name: String,
    pub bdf: String,
    pub firmware_version: String,
    pub pert_version: String,
    /// Sorted, de-duplicated core indices
    pub cores: Vec<u32>,
    pub core_label: String,
}
