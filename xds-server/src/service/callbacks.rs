use data_plane_api::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use tonic::Status;

// Hooks invoked synchronously at stream and fetch lifecycle points. They run
// on the stream's own task and must not block. An error from on_stream_open
// or on_stream_request closes the stream; on_stream_closed still runs.
pub trait Callbacks: Send + Sync {
    fn on_stream_open(&self, _stream_id: i64, _type_url: &str) -> Result<(), Status> {
        Ok(())
    }

    fn on_stream_closed(&self, _stream_id: i64) {}

    fn on_stream_request(&self, _stream_id: i64, _req: &DiscoveryRequest) -> Result<(), Status> {
        Ok(())
    }

    fn on_stream_response(
        &self,
        _stream_id: i64,
        _req: &DiscoveryRequest,
        _rep: &DiscoveryResponse,
    ) {
    }

    fn on_fetch_request(&self, _req: &DiscoveryRequest) -> Result<(), Status> {
        Ok(())
    }

    fn on_fetch_response(&self, _req: &DiscoveryRequest, _rep: &DiscoveryResponse) {}
}
