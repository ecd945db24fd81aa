//! Conversions between the v2 and v3 discovery wire formats.
//!
//! Resource payload bytes are carried over untouched: the v2 and v3 resource
//! messages share field numbering, so only the envelope fields and the type
//! URL strings need rewriting.

use crate::resource::type_url;
use data_plane_api::envoy::api::v2 as api_v2;
use data_plane_api::envoy::api::v2::core as core_v2;
use data_plane_api::envoy::config::core::v3 as core_v3;
use data_plane_api::envoy::service::discovery::v3 as discovery_v3;
use data_plane_api::google::protobuf::Any;

pub fn type_url_to_v3(type_url: &str) -> &str {
    match type_url {
        type_url::CLUSTER_V2 => type_url::CLUSTER,
        type_url::ENDPOINT_V2 => type_url::ENDPOINT,
        type_url::LISTENER_V2 => type_url::LISTENER,
        type_url::ROUTE_V2 => type_url::ROUTE,
        other => other,
    }
}

pub fn type_url_to_v2(type_url: &str) -> &str {
    match type_url {
        type_url::CLUSTER => type_url::CLUSTER_V2,
        type_url::ENDPOINT => type_url::ENDPOINT_V2,
        type_url::LISTENER => type_url::LISTENER_V2,
        type_url::ROUTE => type_url::ROUTE_V2,
        other => other,
    }
}

pub fn node_to_v3(node: &core_v2::Node) -> core_v3::Node {
    core_v3::Node {
        id: node.id.clone(),
        cluster: node.cluster.clone(),
        metadata: node.metadata.clone(),
        locality: node.locality.as_ref().map(|locality| core_v3::Locality {
            region: locality.region.clone(),
            zone: locality.zone.clone(),
            sub_zone: locality.sub_zone.clone(),
        }),
        user_agent_name: String::new(),
    }
}

pub fn node_to_v2(node: &core_v3::Node) -> core_v2::Node {
    core_v2::Node {
        id: node.id.clone(),
        cluster: node.cluster.clone(),
        metadata: node.metadata.clone(),
        locality: node.locality.as_ref().map(|locality| core_v2::Locality {
            region: locality.region.clone(),
            zone: locality.zone.clone(),
            sub_zone: locality.sub_zone.clone(),
        }),
        build_version: String::new(),
    }
}

pub fn request_to_v3(req: &api_v2::DiscoveryRequest) -> discovery_v3::DiscoveryRequest {
    discovery_v3::DiscoveryRequest {
        version_info: req.version_info.clone(),
        node: req.node.as_ref().map(node_to_v3),
        resource_names: req.resource_names.clone(),
        type_url: type_url_to_v3(&req.type_url).to_string(),
        response_nonce: req.response_nonce.clone(),
    }
}

pub fn request_to_v2(req: &discovery_v3::DiscoveryRequest) -> api_v2::DiscoveryRequest {
    api_v2::DiscoveryRequest {
        version_info: req.version_info.clone(),
        node: req.node.as_ref().map(node_to_v2),
        resource_names: req.resource_names.clone(),
        type_url: type_url_to_v2(&req.type_url).to_string(),
        response_nonce: req.response_nonce.clone(),
    }
}

pub fn response_to_v2(rep: &discovery_v3::DiscoveryResponse) -> api_v2::DiscoveryResponse {
    api_v2::DiscoveryResponse {
        version_info: rep.version_info.clone(),
        resources: rep.resources.iter().map(any_to_v2).collect(),
        canary: rep.canary,
        type_url: type_url_to_v2(&rep.type_url).to_string(),
        nonce: rep.nonce.clone(),
    }
}

pub fn response_to_v3(rep: &api_v2::DiscoveryResponse) -> discovery_v3::DiscoveryResponse {
    discovery_v3::DiscoveryResponse {
        version_info: rep.version_info.clone(),
        resources: rep.resources.iter().map(any_to_v3).collect(),
        canary: rep.canary,
        type_url: type_url_to_v3(&rep.type_url).to_string(),
        nonce: rep.nonce.clone(),
    }
}

fn any_to_v2(resource: &Any) -> Any {
    Any {
        type_url: type_url_to_v2(&resource.type_url).to_string(),
        value: resource.value.clone(),
    }
}

fn any_to_v3(resource: &Any) -> Any {
    Any {
        type_url: type_url_to_v3(&resource.type_url).to_string(),
        value: resource.value.clone(),
    }
}
