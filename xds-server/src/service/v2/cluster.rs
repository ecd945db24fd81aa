use crate::cache::Cache;
use crate::resource::type_url::CLUSTER_V2;
use crate::service::common::StreamResponse;
use crate::service::v2::common::Service2;
use data_plane_api::envoy::api::v2::cluster_discovery_service_server::ClusterDiscoveryService;
use data_plane_api::envoy::api::v2::{
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};
use tonic::{Request, Response, Status, Streaming};

#[tonic::async_trait]
impl<C: Cache> ClusterDiscoveryService for Service2<C> {
    type StreamClustersStream = StreamResponse<DiscoveryResponse>;

    async fn stream_clusters(
        &self,
        req: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamClustersStream>, Status> {
        self.stream(req, CLUSTER_V2)
    }

    type DeltaClustersStream = StreamResponse<DeltaDiscoveryResponse>;

    async fn delta_clusters(
        &self,
        _: Request<Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaClustersStream>, Status> {
        Err(Status::unimplemented("delta xDS is not supported"))
    }

    async fn fetch_clusters(
        &self,
        req: Request<DiscoveryRequest>,
    ) -> Result<Response<DiscoveryResponse>, Status> {
        self.fetch(req.into_inner(), CLUSTER_V2).await
    }
}
