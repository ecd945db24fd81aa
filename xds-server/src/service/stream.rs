use crate::cache::{Cache, Payload, Response as WatchResponse};
use crate::resource::type_url::{self, ANY_TYPE};
use crate::service::callbacks::Callbacks;
use crate::service::watches::Watches;
use data_plane_api::envoy::config::core::v3::Node;
use data_plane_api::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use data_plane_api::google::protobuf::Any;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tonic::{Status, Streaming};
use tracing::{debug, info_span, Instrument};

#[cfg(test)]
mod test;

// Drives one bidirectional discovery stream: a three-way select over server
// shutdown, inbound requests, and watch deliveries. The underlying receive
// is cancellable, so no separate drain task is needed.
pub async fn handle_stream<C: Cache>(
    mut requests: Streaming<DiscoveryRequest>,
    responses: mpsc::Sender<Result<DiscoveryResponse, Status>>,
    type_url: &'static str,
    cache: Arc<C>,
    callbacks: Option<Arc<dyn Callbacks>>,
    mut shutdown: watch::Receiver<bool>,
    stream_id: i64,
) {
    let mut stream = Stream::new(responses, type_url, cache, callbacks, stream_id);
    if !stream.open().await {
        stream.closed();
        return;
    }
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            maybe_req = requests.next() => {
                match maybe_req {
                    Some(Ok(req)) => {
                        let span = stream.build_client_request_span(&req);
                        if !stream.handle_client_request(req).instrument(span).await {
                            break;
                        }
                    }
                    Some(Err(status)) => {
                        debug!(stream_id, %status, "receive error");
                        break;
                    }
                    // Client closed its send side.
                    None => break,
                }
            }
            Some((delivered_type, rep)) = stream.watches.next_response() => {
                if !stream.handle_watch_response(&delivered_type, rep).await {
                    break;
                }
            }
        }
    }
    stream.closed();
}

struct Stream<C: Cache> {
    responses: mpsc::Sender<Result<DiscoveryResponse, Status>>,
    type_url: &'static str,
    cache: Arc<C>,
    callbacks: Option<Arc<dyn Callbacks>>,
    stream_id: i64,
    nonce: i64,
    node: Option<Node>,
    watches: Watches<C>,
}

impl<C: Cache> Stream<C> {
    fn new(
        responses: mpsc::Sender<Result<DiscoveryResponse, Status>>,
        type_url: &'static str,
        cache: Arc<C>,
        callbacks: Option<Arc<dyn Callbacks>>,
        stream_id: i64,
    ) -> Self {
        let watches = Watches::new(cache.clone());
        Self {
            responses,
            type_url,
            cache,
            callbacks,
            stream_id,
            nonce: 0,
            node: None,
            watches,
        }
    }

    async fn open(&mut self) -> bool {
        if let Some(callbacks) = &self.callbacks {
            if let Err(status) = callbacks.on_stream_open(self.stream_id, self.type_url) {
                let _ = self.responses.send(Err(status)).await;
                return false;
            }
        }
        true
    }

    fn closed(&self) {
        if let Some(callbacks) = &self.callbacks {
            callbacks.on_stream_closed(self.stream_id);
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
            // Type URL is required for ADS because the gRPC method alone
            // can't tell which resource the request is for.
            let status = Status::invalid_argument("type URL is required for ADS");
            let _ = self.responses.send(Err(status)).await;
            return false;
        } else if req.type_url.is_empty() {
            req.type_url = self.type_url.to_string();
        }

        if let Some(callbacks) = &self.callbacks {
            if let Err(status) = callbacks.on_stream_request(self.stream_id, &req) {
                let _ = self.responses.send(Err(status)).await;
                return false;
            }
        }

        // A request either opens the type on this stream or ACKs the latest
        // response for it; anything else carries a stale nonce and only
        // confirms an older response.
        let acked = match self.watches.nonce(&req.type_url) {
            None => true,
            Some(nonce) => req.response_nonce == nonce.to_string(),
        };
        if !acked {
            debug!(nonce = %req.response_nonce, "stale nonce, ignoring");
            return true;
        }

        // Cancel the outstanding watch to (re-)request a newer version.
        if let Some(id) = self.watches.take_id(&req.type_url) {
            self.cache.cancel_watch(&id).await;
        }
        let (tx, rx) = mpsc::channel(1);
        let watch_id = self.cache.create_watch(&req, tx).await;
        self.watches.arm(&req.type_url, watch_id, rx);
        true
    }

    async fn handle_watch_response(&mut self, type_url: &str, rep: WatchResponse) -> bool {
        let mut out = build_discovery_response(&rep);
        self.nonce += 1;
        out.nonce = self.nonce.to_string();
        if let Some(callbacks) = &self.callbacks {
            callbacks.on_stream_response(self.stream_id, &rep.request, &out);
        }
        if self.responses.send(Ok(out)).await.is_err() {
            return false;
        }
        self.watches.mark_sent(type_url, self.nonce);
        true
    }

    fn build_client_request_span(&self, req: &DiscoveryRequest) -> tracing::Span {
        info_span!(
            "handle_client_request",
            stream_id = self.stream_id,
            type_url = type_url::shorten(&req.type_url),
            response_nonce = %req.response_nonce,
        )
    }
}

// Wraps each resource as a protobuf Any under the response's type URL. Envoy
// byte-compares these payloads to detect changes, so marshaling has to be
// deterministic.
fn build_discovery_response(rep: &WatchResponse) -> DiscoveryResponse {
    let resources: Vec<Any> = match &rep.payload {
        Payload::Marshaled(items) => items
            .iter()
            .map(|value| Any {
                type_url: rep.request.type_url.clone(),
                value: value.clone(),
            })
            .collect(),
        Payload::Typed(items) => items
            .iter()
            .map(|resource| Any {
                type_url: rep.request.type_url.clone(),
                value: resource.marshal(),
            })
            .collect(),
    };
    DiscoveryResponse {
        version_info: rep.version.clone(),
        resources,
        type_url: rep.request.type_url.clone(),
        ..Default::default()
    }
}
