//! Kubelet pod-resources API bindings
//!
//! With the `proto-gen` feature the bindings are generated from
//! `proto/podresources/v1/api.proto` by tonic-build. Otherwise the prost
//! definitions below are used; they only cover the fields the exporter reads,
//! prost skips the rest of the kubelet response while decoding.

#[cfg(feature = "proto-gen")]
pub mod podresources {
    pub mod v1 {
        tonic::include_proto!("v1");
    }
}

#[cfg(not(feature = "proto-gen"))]
pub mod podresources {
    pub mod v1 {
        use prost::Message;

        #[derive(Clone, PartialEq, Message)]
        pub struct ListPodResourcesRequest {}

        #[derive(Clone, PartialEq, Message)]
        pub struct ListPodResourcesResponse {
            #[prost(message, repeated, tag = "1")]
            pub pod_resources: Vec<PodResources>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct PodResources {
            #[prost(string, tag = "1")]
            pub name: String,
            #[prost(string, tag = "2")]
            pub namespace: String,
            #[prost(message, repeated, tag = "3")]
            pub containers: Vec<ContainerResources>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ContainerResources {
            #[prost(string, tag = "1")]
            pub name: String,
            #[prost(message, repeated, tag = "2")]
            pub devices: Vec<ContainerDevices>,
            #[prost(int64, repeated, tag = "3")]
            pub cpu_ids: Vec<i64>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ContainerDevices {
            #[prost(string, tag = "1")]
            pub resource_name: String,
            #[prost(string, repeated, tag = "2")]
            pub device_ids: Vec<String>,
        }

        pub mod pod_resources_lister_client {
            use super::*;
            use tonic::codegen::*;

            #[derive(Debug, Clone)]
            pub struct PodResourcesListerClient<T> {
                inner: tonic::client::Grpc<T>,
            }

            impl PodResourcesListerClient<tonic::transport::Channel> {
                pub fn new(channel: tonic::transport::Channel) -> Self {
                    let inner = tonic::client::Grpc::new(channel);
                    Self { inner }
                }
            }

            impl<T> PodResourcesListerClient<T>
            where
                T: tonic::client::GrpcService<tonic::body::BoxBody>,
                T::Error: Into<StdError>,
                T::ResponseBody: Body<Data = Bytes> + Send + 'static,
                <T::ResponseBody as Body>::Error: Into<StdError> + Send,
            {
                pub async fn list(
                    &mut self,
                    request: impl tonic::IntoRequest<ListPodResourcesRequest>,
                ) -> Result<tonic::Response<ListPodResourcesResponse>, tonic::Status> {
                    self.inner.ready().await.map_err(|e| {
                        tonic::Status::new(
                            tonic::Code::Unknown,
                            format!("Service was not ready: {}", e.into()),
                        )
                    })?;
                    let codec = tonic::codec::ProstCodec::default();
                    let path =
                        http::uri::PathAndQuery::from_static("/v1.PodResourcesLister/List");
                    self.inner.unary(request.into_request(), path, codec).await
                }
            }
        }
    }
}

pub use podresources::v1::pod_resources_lister_client::PodResourcesListerClient;
pub use podresources::v1::*;
