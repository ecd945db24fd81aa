macro_rules! prefix {
    ($type:literal) => {
        concat!("type.googleapis.com/", $type)
    };
}

pub const CLUSTER: &'static str = prefix!("envoy.config.cluster.v3.Cluster");
pub const ENDPOINT: &'static str = prefix!("envoy.config.endpoint.v3.ClusterLoadAssignment");
pub const LISTENER: &'static str = prefix!("envoy.config.listener.v3.Listener");
pub const ROUTE: &'static str = prefix!("envoy.config.route.v3.RouteConfiguration");

pub const CLUSTER_V2: &'static str = prefix!("envoy.api.v2.Cluster");
pub const ENDPOINT_V2: &'static str = prefix!("envoy.api.v2.ClusterLoadAssignment");
pub const LISTENER_V2: &'static str = prefix!("envoy.api.v2.Listener");
pub const ROUTE_V2: &'static str = prefix!("envoy.api.v2.RouteConfiguration");

// ADS carries the type in each request rather than in the gRPC method.
pub const ANY_TYPE: &'static str = "";

// Last path segment, for log output.
pub fn shorten(type_url: &str) -> &str {
    type_url.rsplit('.').next().unwrap_or(type_url)
}
