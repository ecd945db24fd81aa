pub mod resources;

use crate::resource::Resource;
use async_trait::async_trait;
use data_plane_api::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use data_plane_api::envoy::service::load_stats::v2::{LoadStatsRequest, LoadStatsResponse};
use thiserror::Error;
use tokio::sync::mpsc;
use tonic::Status;

// A watch delivers at most once, so a single buffered slot is enough for the
// cache writer to hand off a response without ever blocking on the stream.
pub type WatchResponder = mpsc::Sender<Response>;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct WatchId {
    pub(crate) index: usize,
}

// A response produced by a watch firing. Resources are either carried
// pre-serialized (fast path) or as typed values the stream engine marshals
// just before sending.
#[derive(Debug, Clone)]
pub struct Response {
    pub request: DiscoveryRequest,
    pub version: String,
    pub payload: Payload,
}

#[derive(Debug, Clone)]
pub enum Payload {
    Typed(Vec<Resource>),
    Marshaled(Vec<Vec<u8>>),
}

#[derive(Debug, Error)]
pub enum FetchError {
    // The client is already current; not a failure, just nothing to send.
    #[error("skip fetch: version up to date")]
    VersionUpToDate,
    #[error("resource {0:?} not found")]
    NotFound(String),
    #[error("unrecognized/unsupported type {0:?}")]
    UnknownType(String),
}

impl From<FetchError> for Status {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::VersionUpToDate => Status::already_exists(err.to_string()),
            FetchError::NotFound(_) => Status::not_found(err.to_string()),
            FetchError::UnknownType(_) => Status::invalid_argument(err.to_string()),
        }
    }
}

#[async_trait]
pub trait Cache: Send + Sync + 'static {
    // Either responds on tx immediately, or sets a watch, returning a watch ID.
    async fn create_watch(&self, req: &DiscoveryRequest, tx: WatchResponder) -> Option<WatchId>;

    // Deletes a watch previously created with create_watch.
    async fn cancel_watch(&self, watch_id: &WatchId);

    // Synchronous query path: the full current view for the requested names,
    // or VersionUpToDate when the client has seen it already.
    async fn fetch(&self, req: &DiscoveryRequest) -> Result<DiscoveryResponse, FetchError>;

    // Accepts a load report and returns the reporting instructions.
    async fn set_load(&self, req: &LoadStatsRequest) -> LoadStatsResponse;
}
