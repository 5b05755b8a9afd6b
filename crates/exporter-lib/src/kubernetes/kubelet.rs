//! Kubelet pod-resources API client
//!
//! Lists which pods hold which device plugin resources through the kubelet's
//! local gRPC socket.

use crate::error::RefreshError;
use crate::models::Workload;
use crate::proto::{ListPodResourcesRequest, ListPodResourcesResponse, PodResourcesListerClient};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;
use tracing::debug;

pub const DEFAULT_KUBELET_SOCKET: &str = "/var/lib/kubelet/pod-resources/kubelet.sock";

/// Device ids of one resource class allocated to one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBinding {
    pub workload: Workload,
    pub resource_name: String,
    pub device_ids: Vec<String>,
}

/// Source of pod → device resource bindings
#[async_trait]
pub trait AllocationSource: Send + Sync {
    async fn list_allocations(&self) -> Result<Vec<ResourceBinding>, RefreshError>;
}

/// Configuration for the kubelet client
#[derive(Debug, Clone)]
pub struct KubeletConfig {
    pub socket_path: PathBuf,
    pub request_timeout: Duration,
}

impl Default for KubeletConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_KUBELET_SOCKET),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Client for the kubelet pod-resources `List` call
#[derive(Debug, Clone)]
pub struct KubeletClient {
    config: KubeletConfig,
}

impl KubeletClient {
    pub fn new(config: KubeletConfig) -> Self {
        Self { config }
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Connect a gRPC channel over the kubelet unix socket
    async fn connect(&self) -> Result<Channel, RefreshError> {
        let socket_path = self.config.socket_path.clone();

        if tokio::fs::metadata(&socket_path).await.is_err() {
            return Err(RefreshError::SocketMissing(socket_path));
        }

        let connect_error = |source| RefreshError::Connect {
            path: socket_path.clone(),
            source,
        };

        // The URI is a placeholder, the connector always dials the socket
        let endpoint = Endpoint::try_from("http://[::]:50051")
            .map_err(connect_error)?
            .connect_timeout(self.config.request_timeout);

        let path = socket_path.clone();
        endpoint
            .connect_with_connector(service_fn(move |_: Uri| UnixStream::connect(path.clone())))
            .await
            .map_err(connect_error)
    }

    /// List pod resources; connecting and the call share one request timeout
    pub async fn list_pod_resources(&self) -> Result<ListPodResourcesResponse, RefreshError> {
        debug!(socket = %self.config.socket_path.display(), "Listing pod resources");

        let timeout = self.config.request_timeout;
        tokio::time::timeout(timeout, self.request())
            .await
            .map_err(|_| RefreshError::Timeout(timeout))?
    }

    async fn request(&self) -> Result<ListPodResourcesResponse, RefreshError> {
        let channel = self.connect().await?;
        let mut client = PodResourcesListerClient::new(channel);
        let response = client.list(tonic::Request::new(ListPodResourcesRequest {})).await?;

        Ok(response.into_inner())
    }

    /// Flatten pods → containers → devices into bindings
    pub fn bindings(response: ListPodResourcesResponse) -> Vec<ResourceBinding> {
        let mut bindings = Vec::new();

        for pod in response.pod_resources {
            for container in pod.containers {
                for devices in container.devices {
                    bindings.push(ResourceBinding {
                        workload: Workload::new(&pod.namespace, &pod.name, &container.name),
                        resource_name: devices.resource_name,
                        device_ids: devices.device_ids,
                    });
                }
            }
        }

        bindings
    }
}

#[async_trait]
impl AllocationSource for KubeletClient {
    async fn list_allocations(&self) -> Result<Vec<ResourceBinding>, RefreshError> {
        let response = self.list_pod_resources().await?;
        Ok(Self::bindings(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{ContainerDevices, ContainerResources, PodResources};
    use tokio::net::UnixListener;

    fn client_for(path: PathBuf) -> KubeletClient {
        KubeletClient::new(KubeletConfig {
            socket_path: path,
            request_timeout: Duration::from_millis(500),
        })
    }

    #[test]
    fn test_bindings_flatten_pods() {
        let response = ListPodResourcesResponse {
            pod_resources: vec![PodResources {
                name: "llm-0".to_string(),
                namespace: "serving".to_string(),
                containers: vec![
                    ContainerResources {
                        name: "server".to_string(),
                        devices: vec![
                            ContainerDevices {
                                resource_name: "furiosa.ai/rngd".to_string(),
                                device_ids: vec!["u1".to_string()],
                            },
                            ContainerDevices {
                                resource_name: "nvidia.com/gpu".to_string(),
                                device_ids: vec!["GPU-1".to_string()],
                            },
                        ],
                        cpu_ids: vec![],
                    },
                    ContainerResources {
                        name: "sidecar".to_string(),
                        devices: vec![],
                        cpu_ids: vec![],
                    },
                ],
            }],
        };

        let bindings = KubeletClient::bindings(response);

        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].workload, Workload::new("serving", "llm-0", "server"));
        assert_eq!(bindings[0].resource_name, "furiosa.ai/rngd");
        assert_eq!(bindings[1].device_ids, vec!["GPU-1"]);
    }

    #[tokio::test]
    async fn test_missing_socket_is_reported() {
        let client = client_for(PathBuf::from("/nonexistent/kubelet.sock"));

        let err = client.list_allocations().await.unwrap_err();
        assert!(matches!(err, RefreshError::SocketMissing(_)));
    }

    #[tokio::test]
    async fn test_unresponsive_socket_fails_without_hanging() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kubelet.sock");
        let listener = UnixListener::bind(&path).unwrap();

        // Accept and immediately drop every connection
        let server = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });

        let client = client_for(path);
        let result = tokio::time::timeout(Duration::from_secs(5), client.list_allocations()).await;

        let err = result.expect("request must be bounded").unwrap_err();
        assert!(!matches!(err, RefreshError::SocketMissing(_)));

        server.abort();
    }

    #[tokio::test]
    async fn test_silent_socket_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kubelet.sock");
        let listener = UnixListener::bind(&path).unwrap();

        // Keep every connection open without ever answering
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let client = client_for(path);
        let start = std::time::Instant::now();
        let result = tokio::time::timeout(Duration::from_secs(5), client.list_allocations()).await;

        let err = result.expect("request must be bounded").unwrap_err();
        assert!(matches!(err, RefreshError::Timeout(t) if t == Duration::from_millis(500)));
        assert!(start.elapsed() < Duration::from_secs(2));

        server.abort();
    }
}
