use crate::cache::{Cache, FetchError, Payload, Response, WatchId, WatchResponder};
use crate::resource::{type_url, Resource};
use async_trait::async_trait;
use data_plane_api::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use data_plane_api::envoy::service::load_stats::v2::{LoadStatsRequest, LoadStatsResponse};
use data_plane_api::google::protobuf::{Any, Duration};
use prost::Message;
use slab::Slab;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::{debug, info, warn};

// How often Envoy is told to send load reports.
const LOAD_REPORTING_INTERVAL_SECS: i64 = 2;

// Versioned store of resources keyed by type URL and name. Writes bump a
// cache-wide monotonic counter; the version reported for a response is the
// highest version among the resources it carries, rendered as decimal.
#[derive(Debug, Default)]
pub struct ResourceCache {
    // Plain mutex: every critical section is short and never awaits.
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    version: u64,
    resources: HashMap<String, BTreeMap<String, Entry>>,
    watches: Slab<Watch>,
}

#[derive(Debug)]
struct Entry {
    resource: Resource,
    version: u64,
}

#[derive(Debug)]
struct Watch {
    req: DiscoveryRequest,
    tx: WatchResponder,
    created_version: u64,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    // Adds or replaces a resource under the next version and fires every
    // watch on its type whose view is now stale.
    pub async fn insert(&self, resource: Resource) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.version += 1;
        let version = inner.version;
        let type_url = resource.type_url();
        let name = resource.name().to_string();
        inner
            .resources
            .entry(type_url.to_string())
            .or_default()
            .insert(name.clone(), Entry { resource, version });
        debug!(
            type_url = type_url::shorten(type_url),
            name = %name,
            version,
            "inserted resource"
        );
        inner.fire_watches(type_url);
    }

    pub async fn retrieve(&self, type_url: &str, name: &str) -> Option<(Resource, u64)> {
        let inner = self.inner.lock().expect("cache lock poisoned");
        inner
            .resources
            .get(type_url)
            .and_then(|entries| entries.get(name))
            .map(|entry| (entry.resource.clone(), entry.version))
    }

    // Every resource name of the given type, lexicographically sorted.
    pub async fn all(&self, type_url: &str) -> Vec<String> {
        let inner = self.inner.lock().expect("cache lock poisoned");
        inner.names(type_url)
    }

    // Removes a resource. Watches on the type re-evaluate against the
    // highest remaining version.
    pub async fn remove(&self, type_url: &str, name: &str) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let removed = inner
            .resources
            .get_mut(type_url)
            .is_some_and(|entries| entries.remove(name).is_some());
        if removed {
            debug!(
                type_url = type_url::shorten(type_url),
                name, "removed resource"
            );
            inner.fire_watches(type_url);
        }
    }
}

#[async_trait]
impl Cache for ResourceCache {
    // Either responds on tx immediately, or sets a watch, returning a watch ID.
    async fn create_watch(&self, req: &DiscoveryRequest, tx: WatchResponder) -> Option<WatchId> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        match inner.version_of(req) {
            Some(version) if version.to_string() != req.version_info => {
                // The cache is already ahead of the client, so the first
                // receive on the sink must not block: deliver now.
                let rep = inner.build_response(req, version);
                info!(
                    type_url = type_url::shorten(&req.type_url),
                    version = %rep.version,
                    "responding: new version"
                );
                if tx.try_send(rep).is_err() {
                    debug!("watch receiver dropped before delivery");
                }
                None
            }
            _ => {
                info!(
                    type_url = type_url::shorten(&req.type_url),
                    "set watch: latest version"
                );
                Some(inner.set_watch(req, tx))
            }
        }
    }

    async fn cancel_watch(&self, watch_id: &WatchId) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.watches.try_remove(watch_id.index);
    }

    async fn fetch(&self, req: &DiscoveryRequest) -> Result<DiscoveryResponse, FetchError> {
        let inner = self.inner.lock().expect("cache lock poisoned");
        match req.type_url.as_str() {
            type_url::CLUSTER | type_url::ENDPOINT | type_url::LISTENER | type_url::ROUTE => {
                inner.fetch_type(req)
            }
            other => Err(FetchError::UnknownType(other.to_string())),
        }
    }

    async fn set_load(&self, req: &LoadStatsRequest) -> LoadStatsResponse {
        let inner = self.inner.lock().expect("cache lock poisoned");
        let node_id = req.node.as_ref().map_or("", |node| node.id.as_str());
        debug!(
            node = node_id,
            reports = req.cluster_stats.len(),
            "received load report"
        );
        LoadStatsResponse {
            clusters: inner.names(type_url::CLUSTER),
            load_reporting_interval: Some(Duration {
                seconds: LOAD_REPORTING_INTERVAL_SECS,
                nanos: 0,
            }),
            report_endpoint_granularity: true,
        }
    }
}

impl Inner {
    fn names(&self, type_url: &str) -> Vec<String> {
        self.resources
            .get(type_url)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    // Resolve the requested names; an empty list selects every resource of
    // the type.
    fn requested_names(&self, req: &DiscoveryRequest) -> Vec<String> {
        if req.resource_names.is_empty() {
            self.names(&req.type_url)
        } else {
            let mut names = req.resource_names.clone();
            names.sort();
            names
        }
    }

    // Highest version among the resources matching the request, or None when
    // nothing matches yet.
    fn version_of(&self, req: &DiscoveryRequest) -> Option<u64> {
        let entries = self.resources.get(&req.type_url)?;
        let version = if req.resource_names.is_empty() {
            entries.values().map(|entry| entry.version).max()?
        } else {
            let matching: Vec<u64> = req
                .resource_names
                .iter()
                .filter_map(|name| entries.get(name))
                .map(|entry| entry.version)
                .collect();
            matching.into_iter().max()?
        };
        Some(version)
    }

    fn set_watch(&mut self, req: &DiscoveryRequest, tx: WatchResponder) -> WatchId {
        let watch = Watch {
            req: req.clone(),
            tx,
            created_version: self.version,
        };
        let index = self.watches.insert(watch);
        WatchId { index }
    }

    // Fires and removes every watch on the given type whose known version no
    // longer matches the cache. Delivery is a try_send into a one-slot sink,
    // so a slow stream can never stall the writer.
    fn fire_watches(&mut self, type_url: &str) {
        let stale: Vec<usize> = self
            .watches
            .iter()
            .filter(|(_, watch)| watch.req.type_url == type_url)
            .filter_map(|(index, watch)| match self.version_of(&watch.req) {
                Some(version) if version.to_string() != watch.req.version_info => Some(index),
                _ => None,
            })
            .collect();
        for index in stale {
            let watch = self.watches.remove(index);
            if let Some(version) = self.version_of(&watch.req) {
                let rep = self.build_response(&watch.req, version);
                info!(
                    type_url = type_url::shorten(type_url),
                    version = %rep.version,
                    created_version = watch.created_version,
                    "watch triggered"
                );
                if watch.tx.try_send(rep).is_err() {
                    debug!("watch receiver dropped before delivery");
                }
            }
        }
    }

    // Typed response for the watch path; marshaling happens on the stream.
    fn build_response(&self, req: &DiscoveryRequest, version: u64) -> Response {
        let resources: Vec<Resource> = self
            .requested_names(req)
            .iter()
            .filter_map(|name| {
                self.resources
                    .get(&req.type_url)
                    .and_then(|entries| entries.get(name))
            })
            .map(|entry| entry.resource.clone())
            .collect();
        Response {
            request: req.clone(),
            version: version.to_string(),
            payload: Payload::Typed(resources),
        }
    }

    fn fetch_type(&self, req: &DiscoveryRequest) -> Result<DiscoveryResponse, FetchError> {
        let names = self.requested_names(req);
        let entries = self.resources.get(&req.type_url);
        let mut version = 0;
        let mut resources = Vec::new();
        for name in &names {
            let entry = entries
                .and_then(|entries| entries.get(name))
                .ok_or_else(|| FetchError::NotFound(name.clone()))?;
            if entry.version > version {
                version = entry.version;
            }
            resources.push(Any {
                type_url: req.type_url.clone(),
                value: marshal_for(name, &entry.resource),
            });
        }
        let version_info = version.to_string();
        if version_info == req.version_info {
            return Err(FetchError::VersionUpToDate);
        }
        Ok(DiscoveryResponse {
            version_info,
            resources,
            type_url: req.type_url.clone(),
            ..Default::default()
        })
    }
}

// Stored assignments may carry an empty or stale cluster name; serve them
// under the requested name so Envoy can correlate them with its clusters.
fn marshal_for(name: &str, resource: &Resource) -> Vec<u8> {
    match resource {
        Resource::Endpoint(endpoints) if endpoints.cluster_name != name => {
            warn!(
                cluster = name,
                endpoints_cluster = %endpoints.cluster_name,
                "overriding endpoints cluster name"
            );
            let mut fixed = endpoints.clone();
            fixed.cluster_name = name.to_string();
            fixed.encode_to_vec()
        }
        other => other.marshal(),
    }
}
