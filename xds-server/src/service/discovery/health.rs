use crate::cache::Cache;
use crate::service::common::{Service, StreamResponse};
use data_plane_api::envoy::service::health::v3::health_discovery_service_server::HealthDiscoveryService;
use data_plane_api::envoy::service::health::v3::{
    HealthCheckRequestOrEndpointHealthResponse, HealthCheckSpecifier,
};
use tonic::{Request, Response, Status, Streaming};

// Registered for protocol completeness; health check management is not
// implemented.
#[tonic::async_trait]
impl<C: Cache> HealthDiscoveryService for Service<C> {
    type StreamHealthCheckStream = StreamResponse<HealthCheckSpecifier>;

    async fn stream_health_check(
        &self,
        _: Request<Streaming<HealthCheckRequestOrEndpointHealthResponse>>,
    ) -> Result<Response<Self::StreamHealthCheckStream>, Status> {
        Err(Status::unimplemented("health discovery is not supported"))
    }

    async fn fetch_health_check(
        &self,
        _: Request<HealthCheckRequestOrEndpointHealthResponse>,
    ) -> Result<Response<HealthCheckSpecifier>, Status> {
        Err(Status::unimplemented("health discovery is not supported"))
    }
}
