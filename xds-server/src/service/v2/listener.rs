use crate::cache::Cache;
use crate::resource::type_url::LISTENER_V2;
use crate::service::common::StreamResponse;
use crate::service::v2::common::Service2;
use data_plane_api::envoy::api::v2::listener_discovery_service_server::ListenerDiscoveryService;
use data_plane_api::envoy::api::v2::{
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};
use tonic::{Request, Response, Status, Streaming};

#[tonic::async_trait]
impl<C: Cache> ListenerDiscoveryService for Service2<C> {
    type StreamListenersStream = StreamResponse<DiscoveryResponse>;

    async fn stream_listeners(
        &self,
        req: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamListenersStream>, Status> {
        self.stream(req, LISTENER_V2)
    }

    type DeltaListenersStream = StreamResponse<DeltaDiscoveryResponse>;

    async fn delta_listeners(
        &self,
        _: Request<Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaListenersStream>, Status> {
        Err(Status::unimplemented("delta xDS is not supported"))
    }

    async fn fetch_listeners(
        &self,
        req: Request<DiscoveryRequest>,
    ) -> Result<Response<DiscoveryResponse>, Status> {
        self.fetch(req.into_inner(), LISTENER_V2).await
    }
}
