use crate::cache::{Cache, Response, WatchId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{StreamExt, StreamMap};

// Per-stream watch bookkeeping: for each type URL, the nonce of the last
// response sent and the currently outstanding cache watch. Superseding a
// watch replaces its delivery stream, so a firing that raced with the
// cancellation is dropped instead of replayed.
pub struct Watches<C: Cache> {
    cache: Arc<C>,
    active: HashMap<String, ActiveWatch>,
    deliveries: StreamMap<String, ReceiverStream<Response>>,
}

#[derive(Default)]
struct ActiveWatch {
    nonce: Option<i64>,
    id: Option<WatchId>,
}

impl<C: Cache> Watches<C> {
    pub fn new(cache: Arc<C>) -> Self {
        Self {
            cache,
            active: HashMap::new(),
            deliveries: StreamMap::new(),
        }
    }

    pub fn nonce(&self, type_url: &str) -> Option<i64> {
        self.active.get(type_url).and_then(|watch| watch.nonce)
    }

    // Takes the outstanding watch ID so the caller can cancel it before
    // arming a replacement.
    pub fn take_id(&mut self, type_url: &str) -> Option<WatchId> {
        self.active.get_mut(type_url).and_then(|watch| watch.id.take())
    }

    pub fn arm(&mut self, type_url: &str, id: Option<WatchId>, rx: mpsc::Receiver<Response>) {
        self.active.entry(type_url.to_string()).or_default().id = id;
        self.deliveries
            .insert(type_url.to_string(), ReceiverStream::new(rx));
    }

    // Records the nonce of a sent response; the watch that produced it was
    // consumed by firing.
    pub fn mark_sent(&mut self, type_url: &str, nonce: i64) {
        let watch = self.active.entry(type_url.to_string()).or_default();
        watch.nonce = Some(nonce);
        watch.id = None;
    }

    // Next watch delivery across all types. Resolves to None while no
    // delivery stream is registered.
    pub async fn next_response(&mut self) -> Option<(String, Response)> {
        self.deliveries.next().await
    }
}

pub async fn cancel_all<C: Cache>(ids: Vec<WatchId>, cache: Arc<C>) {
    for id in &ids {
        cache.cancel_watch(id).await;
    }
}

impl<C: Cache> Drop for Watches<C> {
    fn drop(&mut self) {
        let ids: Vec<WatchId> = self
            .active
            .values_mut()
            .filter_map(|watch| watch.id.take())
            .collect();
        if !ids.is_empty() {
            tokio::spawn(cancel_all(ids, self.cache.clone()));
        }
    }
}
