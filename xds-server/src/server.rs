use crate::cache::Cache;
use crate::service::callbacks::Callbacks;
use crate::service::common::Service;
use crate::service::v2::common::Service2;
use data_plane_api::envoy::api::v2::cluster_discovery_service_server::ClusterDiscoveryServiceServer as ClusterDiscoveryServiceServerV2;
use data_plane_api::envoy::api::v2::endpoint_discovery_service_server::EndpointDiscoveryServiceServer as EndpointDiscoveryServiceServerV2;
use data_plane_api::envoy::api::v2::listener_discovery_service_server::ListenerDiscoveryServiceServer as ListenerDiscoveryServiceServerV2;
use data_plane_api::envoy::api::v2::route_discovery_service_server::RouteDiscoveryServiceServer as RouteDiscoveryServiceServerV2;
use data_plane_api::envoy::service::cluster::v3::cluster_discovery_service_server::ClusterDiscoveryServiceServer;
use data_plane_api::envoy::service::discovery::v2::aggregated_discovery_service_server::AggregatedDiscoveryServiceServer as AggregatedDiscoveryServiceServerV2;
use data_plane_api::envoy::service::discovery::v3::aggregated_discovery_service_server::AggregatedDiscoveryServiceServer;
use data_plane_api::envoy::service::endpoint::v3::endpoint_discovery_service_server::EndpointDiscoveryServiceServer;
use data_plane_api::envoy::service::health::v3::health_discovery_service_server::HealthDiscoveryServiceServer;
use data_plane_api::envoy::service::listener::v3::listener_discovery_service_server::ListenerDiscoveryServiceServer;
use data_plane_api::envoy::service::load_stats::v2::load_reporting_service_server::LoadReportingServiceServer;
use data_plane_api::envoy::service::route::v3::route_discovery_service_server::RouteDiscoveryServiceServer;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tonic::transport::Server;
use tracing::info;

// A proxy multiplexes every xDS stream over a single TCP connection, so the
// per-connection stream limit needs far more headroom than the HTTP/2
// default to avoid head-of-line blocking.
pub const GRPC_MAX_CONCURRENT_STREAMS: u32 = 1_000_000;

// Binds the discovery services (v3 and v2) to a listening socket and serves
// until the shutdown context fires.
pub async fn run<C: Cache>(
    addr: SocketAddr,
    cache: Arc<C>,
    callbacks: Option<Arc<dyn Callbacks>>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), tonic::transport::Error> {
    let service = Service::new(cache, callbacks, shutdown.clone());
    let service2 = Service2::new(service.clone());
    let mut signal = shutdown;

    info!(%addr, "management server listening");
    Server::builder()
        .max_concurrent_streams(GRPC_MAX_CONCURRENT_STREAMS)
        .add_service(AggregatedDiscoveryServiceServer::new(service.clone()))
        .add_service(ClusterDiscoveryServiceServer::new(service.clone()))
        .add_service(EndpointDiscoveryServiceServer::new(service.clone()))
        .add_service(ListenerDiscoveryServiceServer::new(service.clone()))
        .add_service(RouteDiscoveryServiceServer::new(service.clone()))
        .add_service(HealthDiscoveryServiceServer::new(service))
        .add_service(AggregatedDiscoveryServiceServerV2::new(service2.clone()))
        .add_service(ClusterDiscoveryServiceServerV2::new(service2.clone()))
        .add_service(EndpointDiscoveryServiceServerV2::new(service2.clone()))
        .add_service(ListenerDiscoveryServiceServerV2::new(service2.clone()))
        .add_service(RouteDiscoveryServiceServerV2::new(service2.clone()))
        .add_service(LoadReportingServiceServer::new(service2))
        .serve_with_shutdown(addr, async move {
            let _ = signal.changed().await;
        })
        .await
}
