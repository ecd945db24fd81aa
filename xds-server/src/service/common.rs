use crate::cache::Cache;
use crate::service::callbacks::Callbacks;
use crate::service::stream::handle_stream;
use data_plane_api::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use futures::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

pub type StreamResponse<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send + 'static>>;

// Shared state behind every discovery service registration. Cloning shares
// the same stream ID counter, so IDs are unique across services.
pub struct Service<C> {
    inner: Arc<Inner<C>>,
}

struct Inner<C> {
    cache: Arc<C>,
    callbacks: Option<Arc<dyn Callbacks>>,
    shutdown: watch::Receiver<bool>,
    stream_count: AtomicI64,
}

impl<C> Clone for Service<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Cache> Service<C> {
    pub fn new(
        cache: Arc<C>,
        callbacks: Option<Arc<dyn Callbacks>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                callbacks,
                shutdown,
                stream_count: AtomicI64::new(0),
            }),
        }
    }

    pub(crate) fn cache(&self) -> Arc<C> {
        self.inner.cache.clone()
    }

    pub(crate) fn shutdown(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.clone()
    }

    pub fn stream(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
        type_url: &'static str,
    ) -> Result<Response<StreamResponse<DiscoveryResponse>>, Status> {
        let input = request.into_inner();
        let (tx, rx) = mpsc::channel(1);
        let output = ReceiverStream::new(rx);
        let stream_id = self.inner.stream_count.fetch_add(1, Ordering::Relaxed) + 1;
        let cache = self.inner.cache.clone();
        let callbacks = self.inner.callbacks.clone();
        let shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            handle_stream(input, tx, type_url, cache, callbacks, shutdown, stream_id).await
        });
        Ok(Response::new(
            Box::pin(output) as StreamResponse<DiscoveryResponse>
        ))
    }

    // Universal fetch backing the typed Fetch RPCs.
    pub async fn fetch(
        &self,
        mut req: DiscoveryRequest,
        type_url: &'static str,
    ) -> Result<Response<DiscoveryResponse>, Status> {
        if req.type_url.is_empty() {
            req.type_url = type_url.to_string();
        }
        if let Some(callbacks) = &self.inner.callbacks {
            callbacks.on_fetch_request(&req)?;
        }
        let rep = self.inner.cache.fetch(&req).await.map_err(Status::from)?;
        if let Some(callbacks) = &self.inner.callbacks {
            callbacks.on_fetch_response(&req, &rep);
        }
        Ok(Response::new(rep))
    }
}
