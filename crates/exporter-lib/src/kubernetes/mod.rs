//! Kubernetes workload correlation
//!
//! Learns which pod holds which NPU (or which cores of it) from the kubelet
//! pod-resources API and attributes metric records accordingly.

mod allocation;
mod kubelet;
mod mapper;
mod refresher;

pub use allocation::{
    AllocationEntry, CoreRange, CoreTopology, DeviceHandle, DEFAULT_CORE_COUNT,
    PARTITIONED_RESOURCE_PATTERN,
};
pub use kubelet::{
    AllocationSource, KubeletClient, KubeletConfig, ResourceBinding, DEFAULT_KUBELET_SOCKET,
};
pub use mapper::{
    AllocationSnapshot, KubeResourcesMapper, MapperConfig, ResourceView, DEFAULT_RESOURCE_PREFIX,
};
pub use refresher::{spawn_refresher, RefreshReporting, RefreshTrigger};
