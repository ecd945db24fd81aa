use crate::cache::Cache;
use crate::resource::type_url::ENDPOINT_V2;
use crate::service::common::StreamResponse;
use crate::service::v2::common::Service2;
use data_plane_api::envoy::api::v2::endpoint_discovery_service_server::EndpointDiscoveryService;
use data_plane_api::envoy::api::v2::{
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};
use tonic::{Request, Response, Status, Streaming};

#[tonic::async_trait]
impl<C: Cache> EndpointDiscoveryService for Service2<C> {
    type StreamEndpointsStream = StreamResponse<DiscoveryResponse>;

    async fn stream_endpoints(
        &self,
        req: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamEndpointsStream>, Status> {
        self.stream(req, ENDPOINT_V2)
    }

    type DeltaEndpointsStream = StreamResponse<DeltaDiscoveryResponse>;

    async fn delta_endpoints(
        &self,
        _: Request<Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaEndpointsStream>, Status> {
        Err(Status::unimplemented("delta xDS is not supported"))
    }

    async fn fetch_endpoints(
        &self,
        req: Request<DiscoveryRequest>,
    ) -> Result<Response<DiscoveryResponse>, Status> {
        self.fetch(req.into_inner(), ENDPOINT_V2).await
    }
}
