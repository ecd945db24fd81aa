use crate::cache::{Cache, FetchError};
use crate::resource::type_url::{self, ANY_TYPE};
use crate::translate;
use data_plane_api::envoy::api::v2::core::Node;
use data_plane_api::envoy::api::v2::{DiscoveryRequest, DiscoveryResponse};
use data_plane_api::envoy::service::discovery::v3 as discovery_v3;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Duration, Instant};
use tonic::{Status, Streaming};
use tracing::{debug, info, warn};

// How often armed streams are offered updates, for clients that poll rather
// than ACK promptly.
const UPDATE_INTERVAL: Duration = Duration::from_secs(2);

// Drives one bidirectional v2 discovery stream. Unlike the v3 engine this is
// fetch-driven: every inbound request is answered from the current cache
// state, and a periodic tick offers CDS/EDS/LDS/RDS updates in between.
pub async fn handle_stream<C: Cache>(
    mut requests: Streaming<DiscoveryRequest>,
    responses: mpsc::Sender<Result<DiscoveryResponse, Status>>,
    type_url: &'static str,
    cache: Arc<C>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut stream = StreamV2::new(responses, type_url, cache);
    let mut tick = interval_at(Instant::now() + UPDATE_INTERVAL, UPDATE_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            maybe_req = requests.next() => {
                match maybe_req {
                    Some(Ok(req)) => {
                        if !stream.handle_client_request(req).await {
                            break;
                        }
                    }
                    Some(Err(status)) => {
                        debug!(%status, "receive error");
                        break;
                    }
                    None => break,
                }
            }
            _ = tick.tick() => {
                if !stream.push_updates().await {
                    break;
                }
            }
        }
    }
}

struct StreamV2<C: Cache> {
    responses: mpsc::Sender<Result<DiscoveryResponse, Status>>,
    type_url: &'static str,
    cache: Arc<C>,
    nonce: i64,
    node: Option<Node>,
    // Last version sent on this stream, keyed by v3 type URL.
    version_info: HashMap<String, String>,
}

impl<C: Cache> StreamV2<C> {
    fn new(
        responses: mpsc::Sender<Result<DiscoveryResponse, Status>>,
        type_url: &'static str,
        cache: Arc<C>,
    ) -> Self {
        Self {
            responses,
            type_url,
            cache,
            nonce: 0,
            node: None,
            version_info: HashMap::new(),
        }
    }

    async fn handle_client_request(&mut self, mut req: DiscoveryRequest) -> bool {
        // Node might only be sent on the first request to save re-sending
        // the same data; remember it for the requests that follow.
        if req.node.is_some() {
            self.node = req.node.clone();
        } else {
            req.node = self.node.clone();
        }

        if self.type_url == ANY_TYPE && req.type_url.is_empty() {
            let status = Status::invalid_argument("type URL is required for ADS");
            let _ = self.responses.send(Err(status)).await;
            return false;
        } else if req.type_url.is_empty() {
            req.type_url = self.type_url.to_string();
        }

        let req3 = translate::request_to_v3(&req);
        match self.cache.fetch(&req3).await {
            Ok(rep3) => self.respond(rep3).await,
            Err(FetchError::VersionUpToDate) => {
                debug!(
                    type_url = type_url::shorten(&req3.type_url),
                    "update not needed: version up to date"
                );
                true
            }
            Err(err) => {
                let _ = self.responses.send(Err(Status::from(err))).await;
                false
            }
        }
    }

    // One pass of the periodic push: offer every type with the version last
    // acknowledged on this stream, skipping types that have not advanced.
    async fn push_updates(&mut self) -> bool {
        for type_url in [
            type_url::CLUSTER,
            type_url::ENDPOINT,
            type_url::LISTENER,
            type_url::ROUTE,
        ] {
            let req3 = discovery_v3::DiscoveryRequest {
                version_info: self.version_info.get(type_url).cloned().unwrap_or_default(),
                type_url: type_url.to_string(),
                node: self.node.as_ref().map(translate::node_to_v3),
                ..Default::default()
            };
            match self.cache.fetch(&req3).await {
                Ok(rep3) => {
                    if !self.respond(rep3).await {
                        return false;
                    }
                }
                Err(FetchError::VersionUpToDate) => continue,
                Err(err) => {
                    warn!(
                        type_url = type_url::shorten(type_url),
                        %err,
                        "periodic fetch failed"
                    );
                    continue;
                }
            }
        }
        true
    }

    // Sends the response unless a response with the same version was already
    // sent for this type on this stream.
    async fn respond(&mut self, rep3: discovery_v3::DiscoveryResponse) -> bool {
        let type_url = rep3.type_url.clone();
        if self.version_info.get(&type_url) == Some(&rep3.version_info) {
            debug!(
                type_url = type_url::shorten(&type_url),
                version = %rep3.version_info,
                "update not needed: version up to date"
            );
            return true;
        }
        let version = rep3.version_info.clone();
        let mut rep2 = translate::response_to_v2(&rep3);
        self.nonce += 1;
        rep2.nonce = self.nonce.to_string();
        if self.responses.send(Ok(rep2)).await.is_err() {
            return false;
        }
        info!(
            type_url = type_url::shorten(&type_url),
            version = %version,
            "updated"
        );
        self.version_info.insert(type_url, version);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::resources::ResourceCache;
    use crate::resource::{make_cluster, Resource};

    fn request(type_url: &str, version: &str) -> DiscoveryRequest {
        DiscoveryRequest {
            node: Some(Node {
                id: "foobar".to_string(),
                ..Node::default()
            }),
            type_url: type_url.to_string(),
            version_info: version.to_string(),
            ..DiscoveryRequest::default()
        }
    }

    async fn seeded_cache() -> Arc<ResourceCache> {
        let cache = Arc::new(ResourceCache::new());
        cache.insert(Resource::Cluster(make_cluster("a"))).await;
        cache.insert(Resource::Cluster(make_cluster("b"))).await;
        cache
    }

    #[tokio::test]
    async fn test_request_is_answered_from_cache() {
        let cache = seeded_cache().await;
        let (tx, mut rx) = mpsc::channel(8);
        let mut stream = StreamV2::new(tx, type_url::CLUSTER_V2, cache);
        assert!(stream.handle_client_request(request(type_url::CLUSTER_V2, "")).await);
        let rep = rx.recv().await.unwrap().unwrap();
        assert_eq!(rep.version_info, "2");
        assert_eq!(rep.type_url, type_url::CLUSTER_V2);
        assert_eq!(rep.nonce, "1");
        assert_eq!(rep.resources.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_version_is_not_resent() {
        let cache = seeded_cache().await;
        let (tx, mut rx) = mpsc::channel(8);
        let mut stream = StreamV2::new(tx, type_url::CLUSTER_V2, cache);
        stream.handle_client_request(request(type_url::CLUSTER_V2, "")).await;
        rx.recv().await.unwrap().unwrap();
        // Same stale client version again: the cache still reports version 2,
        // but this stream already sent it.
        assert!(stream.handle_client_request(request(type_url::CLUSTER_V2, "")).await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_type_url_defaults_to_stream_type() {
        let cache = seeded_cache().await;
        let (tx, mut rx) = mpsc::channel(8);
        let mut stream = StreamV2::new(tx, type_url::CLUSTER_V2, cache);
        assert!(stream.handle_client_request(request("", "")).await);
        let rep = rx.recv().await.unwrap().unwrap();
        assert_eq!(rep.type_url, type_url::CLUSTER_V2);
    }

    #[tokio::test]
    async fn test_ads_requires_type_url() {
        let cache = seeded_cache().await;
        let (tx, mut rx) = mpsc::channel(8);
        let mut stream = StreamV2::new(tx, ANY_TYPE, cache);
        assert!(!stream.handle_client_request(request("", "")).await);
        let status = rx.recv().await.unwrap().unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_push_updates_sends_only_advanced_versions() {
        let cache = seeded_cache().await;
        let (tx, mut rx) = mpsc::channel(8);
        let mut stream = StreamV2::new(tx, type_url::CLUSTER_V2, cache.clone());
        stream.handle_client_request(request(type_url::CLUSTER_V2, "")).await;
        let rep = rx.recv().await.unwrap().unwrap();
        assert_eq!(rep.version_info, "2");

        // First pass announces the remaining types at their current state.
        assert!(stream.push_updates().await);
        let endpoints = rx.recv().await.unwrap().unwrap();
        assert_eq!(endpoints.type_url, type_url::ENDPOINT_V2);
        assert_eq!(endpoints.version_info, "0");
        let listeners = rx.recv().await.unwrap().unwrap();
        assert_eq!(listeners.type_url, type_url::LISTENER_V2);
        let routes = rx.recv().await.unwrap().unwrap();
        assert_eq!(routes.type_url, type_url::ROUTE_V2);

        // Nothing changed, so the next pass stays quiet.
        assert!(stream.push_updates().await);
        assert!(rx.try_recv().is_err());

        // A write makes exactly the affected type push again.
        cache.insert(Resource::Cluster(make_cluster("c"))).await;
        assert!(stream.push_updates().await);
        let rep = rx.recv().await.unwrap().unwrap();
        assert_eq!(rep.type_url, type_url::CLUSTER_V2);
        assert_eq!(rep.version_info, "3");
        assert!(rx.try_recv().is_err());
    }
}
