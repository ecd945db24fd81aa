//! Loads cluster definitions from the configuration directory into the
//! cache at startup.

use crate::cache::resources::ResourceCache;
use crate::resource::{make_cluster, Resource};
use data_plane_api::envoy::config::core::v3::address::Address as AddressKind;
use data_plane_api::envoy::config::core::v3::socket_address::PortSpecifier;
use data_plane_api::envoy::config::core::v3::{Address, SocketAddress};
use data_plane_api::envoy::config::endpoint::v3::lb_endpoint::HostIdentifier;
use data_plane_api::envoy::config::endpoint::v3::{
    ClusterLoadAssignment, Endpoint, LbEndpoint, LocalityLbEndpoints,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

// One JSON document per file:
//
//   {
//     "cluster_name": "example",
//     "endpoints": [{"address": "10.0.0.1", "port": 8080}]
//   }
#[derive(Debug, Deserialize)]
struct ClusterDef {
    cluster_name: String,
    #[serde(default)]
    endpoints: Vec<EndpointDef>,
}

#[derive(Debug, Deserialize)]
struct EndpointDef {
    address: String,
    port: u16,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("failed to read configuration directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("cluster definition {path:?} has an empty cluster name")]
    MissingName { path: PathBuf },
}

// Reads every *.json file in the directory and inserts, per definition, the
// load assignment plus the EDS cluster shell derived from it. Returns the
// number of clusters loaded.
pub async fn load_clusters(dir: &Path, cache: &ResourceCache) -> Result<usize, BootstrapError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    // Deterministic insertion order gives deterministic versions.
    paths.sort();

    let mut count = 0;
    for path in paths {
        let data = fs::read_to_string(&path)?;
        let def: ClusterDef = serde_json::from_str(&data).map_err(|source| {
            BootstrapError::Parse {
                path: path.clone(),
                source,
            }
        })?;
        if def.cluster_name.is_empty() {
            return Err(BootstrapError::MissingName { path });
        }
        debug!(
            cluster = %def.cluster_name,
            endpoints = def.endpoints.len(),
            path = %path.display(),
            "loaded cluster definition"
        );
        cache
            .insert(Resource::Cluster(make_cluster(&def.cluster_name)))
            .await;
        cache
            .insert(Resource::Endpoint(def.to_load_assignment()))
            .await;
        count += 1;
    }
    Ok(count)
}

impl ClusterDef {
    fn to_load_assignment(&self) -> ClusterLoadAssignment {
        let lb_endpoints = self
            .endpoints
            .iter()
            .map(|endpoint| LbEndpoint {
                host_identifier: Some(HostIdentifier::Endpoint(Endpoint {
                    address: Some(Address {
                        address: Some(AddressKind::SocketAddress(SocketAddress {
                            address: endpoint.address.clone(),
                            port_specifier: Some(PortSpecifier::PortValue(u32::from(
                                endpoint.port,
                            ))),
                        })),
                    }),
                    hostname: String::new(),
                })),
                load_balancing_weight: None,
            })
            .collect();
        ClusterLoadAssignment {
            cluster_name: self.cluster_name.clone(),
            endpoints: vec![LocalityLbEndpoints {
                locality: None,
                lb_endpoints,
                load_balancing_weight: None,
                priority: 0,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::type_url;

    fn write_config(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[tokio::test]
    async fn test_load_clusters_populates_cache() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "a.json",
            r#"{"cluster_name": "a", "endpoints": [{"address": "10.0.0.1", "port": 8080}]}"#,
        );
        write_config(dir.path(), "b.json", r#"{"cluster_name": "b"}"#);
        // Non-JSON files are ignored.
        write_config(dir.path(), "notes.txt", "not a cluster");

        let cache = ResourceCache::new();
        let count = load_clusters(dir.path(), &cache).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(cache.all(type_url::CLUSTER).await, vec!["a", "b"]);
        assert_eq!(cache.all(type_url::ENDPOINT).await, vec!["a", "b"]);

        let (resource, _) = cache.retrieve(type_url::ENDPOINT, "a").await.unwrap();
        match resource {
            Resource::Endpoint(endpoints) => {
                assert_eq!(endpoints.cluster_name, "a");
                assert_eq!(endpoints.endpoints[0].lb_endpoints.len(), 1);
            }
            other => panic!("expected endpoints, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_load_clusters_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "bad.json", "{");
        let cache = ResourceCache::new();
        let result = load_clusters(dir.path(), &cache).await;
        assert!(matches!(result, Err(BootstrapError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_load_clusters_rejects_missing_name() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "unnamed.json", r#"{"cluster_name": ""}"#);
        let cache = ResourceCache::new();
        let result = load_clusters(dir.path(), &cache).await;
        assert!(matches!(result, Err(BootstrapError::MissingName { .. })));
    }

    #[tokio::test]
    async fn test_load_clusters_missing_directory_fails() {
        let cache = ResourceCache::new();
        let result = load_clusters(Path::new("/nonexistent-conf-dir"), &cache).await;
        assert!(matches!(result, Err(BootstrapError::Io(_))));
    }
}
