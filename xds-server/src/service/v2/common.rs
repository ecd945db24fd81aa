use crate::cache::Cache;
use crate::service::common::{Service, StreamResponse};
use crate::service::v2::stream::handle_stream;
use crate::translate;
use data_plane_api::envoy::api::v2::{DiscoveryRequest, DiscoveryResponse};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

// The v2 API is a thin adapter around the v3 core: requests are translated
// on ingress, served from the same cache, and responses translated on
// egress. Streams are fetch-driven with a periodic push for clients that
// poll rather than ACK promptly.
pub struct Service2<C> {
    service: Service<C>,
}

impl<C> Clone for Service2<C> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
        }
    }
}

impl<C: Cache> Service2<C> {
    pub fn new(service: Service<C>) -> Self {
        Self { service }
    }

    pub(crate) fn cache(&self) -> Arc<C> {
        self.service.cache()
    }

    pub(crate) fn shutdown(&self) -> watch::Receiver<bool> {
        self.service.shutdown()
    }

    pub fn stream(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
        type_url: &'static str,
    ) -> Result<Response<StreamResponse<DiscoveryResponse>>, Status> {
        let input = request.into_inner();
        let (tx, rx) = mpsc::channel(1);
        let output = ReceiverStream::new(rx);
        let cache = self.cache();
        let shutdown = self.shutdown();
        tokio::spawn(async move { handle_stream(input, tx, type_url, cache, shutdown).await });
        Ok(Response::new(
            Box::pin(output) as StreamResponse<DiscoveryResponse>
        ))
    }

    // Universal fetch for the v2 Fetch RPCs.
    pub async fn fetch(
        &self,
        mut req: DiscoveryRequest,
        type_url: &'static str,
    ) -> Result<Response<DiscoveryResponse>, Status> {
        if req.type_url.is_empty() {
            req.type_url = type_url.to_string();
        }
        let req3 = translate::request_to_v3(&req);
        let rep3 = self.cache().fetch(&req3).await.map_err(Status::from)?;
        Ok(Response::new(translate::response_to_v2(&rep3)))
    }
}
