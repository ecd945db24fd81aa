pub mod type_url;

use data_plane_api::envoy::config::cluster::v3::cluster::{
    ClusterDiscoveryType, DiscoveryType, EdsClusterConfig, LbPolicy,
};
use data_plane_api::envoy::config::cluster::v3::Cluster;
use data_plane_api::envoy::config::core::v3::config_source::ConfigSourceSpecifier;
use data_plane_api::envoy::config::core::v3::{AggregatedConfigSource, ConfigSource};
use data_plane_api::envoy::config::endpoint::v3::ClusterLoadAssignment;
use data_plane_api::envoy::config::listener::v3::Listener;
use data_plane_api::envoy::config::route::v3::RouteConfiguration;
use data_plane_api::google::protobuf::{Any, Duration};
use prost::Message;

#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone)]
pub enum Resource {
    Cluster(Cluster),
    Endpoint(ClusterLoadAssignment),
    Listener(Listener),
    Route(RouteConfiguration),
}

impl Resource {
    pub fn name(&self) -> &str {
        match self {
            Resource::Cluster(cluster) => &cluster.name,
            Resource::Endpoint(endpoints) => &endpoints.cluster_name,
            Resource::Listener(listener) => &listener.name,
            Resource::Route(route) => &route.name,
        }
    }

    pub fn type_url(&self) -> &'static str {
        match self {
            Resource::Cluster(_) => type_url::CLUSTER,
            Resource::Endpoint(_) => type_url::ENDPOINT,
            Resource::Listener(_) => type_url::LISTENER,
            Resource::Route(_) => type_url::ROUTE,
        }
    }

    // Envoy detects changes by byte-comparing serialized resources, so the
    // encoding must be deterministic. prost writes fields in tag order,
    // which holds for every message variant here (no map fields).
    pub fn marshal(&self) -> Vec<u8> {
        match self {
            Resource::Cluster(cluster) => cluster.encode_to_vec(),
            Resource::Endpoint(endpoints) => endpoints.encode_to_vec(),
            Resource::Listener(listener) => listener.encode_to_vec(),
            Resource::Route(route) => route.encode_to_vec(),
        }
    }

    pub fn into_any(&self) -> Any {
        Any {
            type_url: self.type_url().to_string(),
            value: self.marshal(),
        }
    }
}

// Builds the EDS cluster shell served for a named cluster: endpoints are
// discovered over the aggregated stream rather than embedded here.
pub fn make_cluster(name: &str) -> Cluster {
    Cluster {
        name: name.to_string(),
        cluster_discovery_type: Some(ClusterDiscoveryType::Type(DiscoveryType::Eds as i32)),
        eds_cluster_config: Some(EdsClusterConfig {
            eds_config: Some(ConfigSource {
                config_source_specifier: Some(ConfigSourceSpecifier::Ads(
                    AggregatedConfigSource {},
                )),
            }),
            service_name: String::new(),
        }),
        connect_timeout: Some(Duration {
            seconds: 5,
            nanos: 0,
        }),
        lb_policy: LbPolicy::RoundRobin as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_cluster_is_eds() {
        let cluster = make_cluster("foobar");
        assert_eq!(cluster.name, "foobar");
        assert_eq!(
            cluster.cluster_discovery_type,
            Some(ClusterDiscoveryType::Type(DiscoveryType::Eds as i32))
        );
        assert!(cluster.eds_cluster_config.is_some());
    }

    #[test]
    fn resource_name_and_type() {
        let resource = Resource::Endpoint(ClusterLoadAssignment {
            cluster_name: "foobar".to_string(),
            endpoints: Vec::new(),
        });
        assert_eq!(resource.name(), "foobar");
        assert_eq!(resource.type_url(), type_url::ENDPOINT);
    }

    #[test]
    fn into_any_wraps_marshaled_bytes() {
        let resource = Resource::Cluster(make_cluster("foobar"));
        let any = resource.into_any();
        assert_eq!(any.type_url, type_url::CLUSTER);
        assert_eq!(any.value, resource.marshal());
    }
}
