use super::*;
use crate::cache::{Cache, FetchError, WatchId, WatchResponder};
use crate::resource::type_url::{ANY_TYPE, CLUSTER, ENDPOINT};
use async_trait::async_trait;
use data_plane_api::envoy::service::load_stats::v2::{LoadStatsRequest, LoadStatsResponse};
use std::sync::Mutex;
use tonic::Code;

// Records every watch interaction so tests can assert on what the stream
// asked of the cache. Deliveries are produced by the test itself through
// the captured senders.
#[derive(Default)]
struct RecordingCache {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    watches: Vec<(DiscoveryRequest, WatchResponder)>,
    cancelled: Vec<WatchId>,
    arm_as: Option<WatchId>,
}

#[async_trait]
impl Cache for RecordingCache {
    async fn create_watch(&self, req: &DiscoveryRequest, tx: WatchResponder) -> Option<WatchId> {
        let mut state = self.state.lock().unwrap();
        state.watches.push((req.clone(), tx));
        state.arm_as.clone()
    }

    async fn cancel_watch(&self, watch_id: &WatchId) {
        self.state.lock().unwrap().cancelled.push(watch_id.clone());
    }

    async fn fetch(&self, _req: &DiscoveryRequest) -> Result<DiscoveryResponse, FetchError> {
        unimplemented!()
    }

    async fn set_load(&self, _req: &LoadStatsRequest) -> LoadStatsResponse {
        LoadStatsResponse::default()
    }
}

impl RecordingCache {
    // The next create_watch call reports an armed watch under this ID.
    fn arm_as(&self, id: WatchId) {
        self.state.lock().unwrap().arm_as = Some(id);
    }

    fn watch_requests(&self) -> Vec<DiscoveryRequest> {
        self.state
            .lock()
            .unwrap()
            .watches
            .iter()
            .map(|(req, _)| req.clone())
            .collect()
    }

    fn watch_sender(&self, index: usize) -> (DiscoveryRequest, WatchResponder) {
        self.state.lock().unwrap().watches[index].clone()
    }

    fn cancelled(&self) -> Vec<WatchId> {
        self.state.lock().unwrap().cancelled.clone()
    }
}

// One stream under test plus the client's view of it.
struct Harness {
    stream: Stream<RecordingCache>,
    cache: Arc<RecordingCache>,
    client: mpsc::Receiver<Result<DiscoveryResponse, Status>>,
}

impl Harness {
    fn on(type_url: &'static str) -> Self {
        let (tx, client) = mpsc::channel(1);
        let cache = Arc::new(RecordingCache::default());
        let stream = Stream::new(tx, type_url, cache.clone(), None, 1);
        Self {
            stream,
            cache,
            client,
        }
    }

    // Pushes a cache delivery through the watch armed by the given
    // create_watch call and returns what the client receives.
    async fn fire(&mut self, index: usize, version: &str) -> DiscoveryResponse {
        let (req, tx) = self.cache.watch_sender(index);
        tx.send(WatchResponse {
            request: req,
            version: version.to_string(),
            payload: Payload::Typed(Vec::new()),
        })
        .await
        .unwrap();
        let (delivered_type, rep) = self.stream.watches.next_response().await.unwrap();
        assert!(self.stream.handle_watch_response(&delivered_type, rep).await);
        self.client.recv().await.unwrap().unwrap()
    }
}

fn request(type_url: &str, version: &str, nonce: &str) -> DiscoveryRequest {
    DiscoveryRequest {
        type_url: type_url.to_string(),
        version_info: version.to_string(),
        response_nonce: nonce.to_string(),
        ..DiscoveryRequest::default()
    }
}

fn request_with_node(type_url: &str) -> DiscoveryRequest {
    DiscoveryRequest {
        node: Some(Node {
            id: "proxy-0".to_string(),
            ..Node::default()
        }),
        ..request(type_url, "", "")
    }
}

#[tokio::test]
async fn test_node_is_remembered_once_sent() {
    let mut h = Harness::on(CLUSTER);
    h.stream.handle_client_request(request_with_node(CLUSTER)).await;
    // Follow-ups delta-compress the node away; the stream restores it.
    h.stream.handle_client_request(request(CLUSTER, "", "")).await;
    let reqs = h.cache.watch_requests();
    assert_eq!(reqs.len(), 2);
    for req in reqs {
        assert_eq!(
            req.node.as_ref().map(|node| node.id.as_str()),
            Some("proxy-0")
        );
    }
}

#[tokio::test]
async fn test_empty_type_url_defaults_to_stream_type() {
    let mut h = Harness::on(CLUSTER);
    h.stream.handle_client_request(request_with_node("")).await;
    let reqs = h.cache.watch_requests();
    assert_eq!(reqs.len(), 1);
    assert_eq!(reqs[0].type_url, CLUSTER);
}

// A request without a type URL on an aggregated stream closes the stream
// with InvalidArgument, and no watch is created for it.
#[tokio::test]
async fn test_aggregated_stream_closes_on_missing_type_url() {
    let mut h = Harness::on(ANY_TYPE);
    assert!(!h.stream.handle_client_request(request_with_node("")).await);
    assert!(h.cache.watch_requests().is_empty());
    let status = h.client.try_recv().unwrap().unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
    assert_eq!(status.message(), "type URL is required for ADS");
}

#[tokio::test]
async fn test_stream_teardown_cancels_outstanding_watches() {
    let mut h = Harness::on(ANY_TYPE);
    h.cache.arm_as(WatchId { index: 4 });
    h.stream.handle_client_request(request_with_node(CLUSTER)).await;
    h.cache.arm_as(WatchId { index: 7 });
    h.stream.handle_client_request(request_with_node(ENDPOINT)).await;
    drop(h.stream);
    // Cancellation runs on a detached task; poll until it has landed.
    for _ in 0..50 {
        if h.cache.cancelled().len() == 2 {
            break;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(1)).await;
    }
    let mut cancelled = h.cache.cancelled();
    cancelled.sort();
    assert_eq!(cancelled, vec![WatchId { index: 4 }, WatchId { index: 7 }]);
}

#[tokio::test]
async fn test_request_before_any_response_supersedes_watch() {
    let mut h = Harness::on(CLUSTER);
    h.cache.arm_as(WatchId { index: 0 });
    h.stream.handle_client_request(request_with_node(CLUSTER)).await;
    // No response went out yet, so the next request re-arms and must cancel
    // the watch it replaces.
    h.cache.arm_as(WatchId { index: 1 });
    h.stream.handle_client_request(request(CLUSTER, "", "")).await;
    assert_eq!(h.cache.watch_requests().len(), 2);
    assert_eq!(h.cache.cancelled(), vec![WatchId { index: 0 }]);
}

#[tokio::test]
async fn test_ack_rearms_watch() {
    let mut h = Harness::on(CLUSTER);
    h.stream.handle_client_request(request_with_node(CLUSTER)).await;
    let out = h.fire(0, "2").await;
    assert_eq!(out.nonce, "1");
    assert_eq!(out.version_info, "2");
    h.stream.handle_client_request(request(CLUSTER, "2", "1")).await;
    assert_eq!(h.cache.watch_requests().len(), 2);
    // The previous watch was consumed by firing, not cancelled.
    assert!(h.cache.cancelled().is_empty());
}

#[tokio::test]
async fn test_stale_nonce_is_ignored() {
    let mut h = Harness::on(CLUSTER);
    h.stream.handle_client_request(request_with_node(CLUSTER)).await;
    let out = h.fire(0, "2").await;
    assert_eq!(out.nonce, "1");
    // A nonce that doesn't match the last response only confirms an older
    // one: no new watch, no cancellation.
    assert!(h.stream.handle_client_request(request(CLUSTER, "2", "0")).await);
    assert_eq!(h.cache.watch_requests().len(), 1);
    assert!(h.cache.cancelled().is_empty());
}

#[tokio::test]
async fn test_nonces_increase_from_one() {
    let mut h = Harness::on(CLUSTER);
    h.stream.handle_client_request(request_with_node(CLUSTER)).await;
    let out = h.fire(0, "2").await;
    assert_eq!(out.nonce, "1");
    h.stream.handle_client_request(request(CLUSTER, "2", "1")).await;
    let out = h.fire(1, "3").await;
    assert_eq!(out.nonce, "2");
    assert_eq!(out.version_info, "3");
}

// Cold start, ACK and write-triggered push against the real cache.
#[tokio::test]
async fn test_cold_start_ack_and_push() {
    use crate::cache::resources::ResourceCache;
    use crate::resource::{make_cluster, Resource};
    use data_plane_api::envoy::config::cluster::v3::Cluster;
    use prost::Message;

    let cache = Arc::new(ResourceCache::new());
    cache.insert(Resource::Cluster(make_cluster("a"))).await;
    cache.insert(Resource::Cluster(make_cluster("b"))).await;
    let (tx, mut rx) = mpsc::channel(1);
    let mut stream = Stream::new(tx, CLUSTER, cache.clone(), None, 1);

    // An empty client version gets the full state immediately.
    assert!(stream.handle_client_request(request_with_node(CLUSTER)).await);
    let (delivered_type, rep) = stream.watches.next_response().await.unwrap();
    assert!(stream.handle_watch_response(&delivered_type, rep).await);
    let out = rx.recv().await.unwrap().unwrap();
    assert_eq!(out.version_info, "2");
    assert_eq!(out.nonce, "1");
    assert_eq!(out.type_url, CLUSTER);
    assert_eq!(out.resources.len(), 2);
    let first = Cluster::decode(out.resources[0].value.as_slice()).unwrap();
    assert_eq!(first.name, "a");

    // ACK arms a watch; nothing is sent until a write happens.
    assert!(stream.handle_client_request(request(CLUSTER, "2", "1")).await);
    assert!(rx.try_recv().is_err());

    cache.insert(Resource::Cluster(make_cluster("a"))).await;
    let (delivered_type, rep) = stream.watches.next_response().await.unwrap();
    assert!(stream.handle_watch_response(&delivered_type, rep).await);
    let out = rx.recv().await.unwrap().unwrap();
    assert_eq!(out.version_info, "3");
    assert_eq!(out.nonce, "2");
}
