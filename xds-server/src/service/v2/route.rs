use crate::cache::Cache;
use crate::resource::type_url::ROUTE_V2;
use crate::service::common::StreamResponse;
use crate::service::v2::common::Service2;
use data_plane_api::envoy::api::v2::route_discovery_service_server::RouteDiscoveryService;
use data_plane_api::envoy::api::v2::{
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};
use tonic::{Request, Response, Status, Streaming};

#[tonic::async_trait]
impl<C: Cache> RouteDiscoveryService for Service2<C> {
    type StreamRoutesStream = StreamResponse<DiscoveryResponse>;

    async fn stream_routes(
        &self,
        req: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamRoutesStream>, Status> {
        self.stream(req, ROUTE_V2)
    }

    type DeltaRoutesStream = StreamResponse<DeltaDiscoveryResponse>;

    async fn delta_routes(
        &self,
        _: Request<Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaRoutesStream>, Status> {
        Err(Status::unimplemented("delta xDS is not supported"))
    }

    async fn fetch_routes(
        &self,
        req: Request<DiscoveryRequest>,
    ) -> Result<Response<DiscoveryResponse>, Status> {
        self.fetch(req.into_inner(), ROUTE_V2).await
    }
}
