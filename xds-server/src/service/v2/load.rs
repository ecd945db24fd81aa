use crate::cache::Cache;
use crate::service::common::StreamResponse;
use crate::service::v2::common::Service2;
use data_plane_api::envoy::service::load_stats::v2::load_reporting_service_server::LoadReportingService;
use data_plane_api::envoy::service::load_stats::v2::{LoadStatsRequest, LoadStatsResponse};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::debug;

// Every inbound report is routed to the cache; the reporting instructions
// go out once, on the first report.
pub async fn handle_load_stream<C: Cache>(
    mut requests: Streaming<LoadStatsRequest>,
    responses: mpsc::Sender<Result<LoadStatsResponse, Status>>,
    cache: Arc<C>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut responded = false;
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            maybe_req = requests.next() => {
                match maybe_req {
                    Some(Ok(req)) => {
                        let rep = cache.set_load(&req).await;
                        if !responded {
                            if responses.send(Ok(rep)).await.is_err() {
                                break;
                            }
                            responded = true;
                        }
                    }
                    Some(Err(status)) => {
                        debug!(%status, "receive error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}

#[tonic::async_trait]
impl<C: Cache> LoadReportingService for Service2<C> {
    type StreamLoadStatsStream = StreamResponse<LoadStatsResponse>;

    async fn stream_load_stats(
        &self,
        request: Request<Streaming<LoadStatsRequest>>,
    ) -> Result<Response<Self::StreamLoadStatsStream>, Status> {
        let input = request.into_inner();
        let (tx, rx) = mpsc::channel(1);
        let output = ReceiverStream::new(rx);
        let cache = self.cache();
        let shutdown = self.shutdown();
        tokio::spawn(async move { handle_load_stream(input, tx, cache, shutdown).await });
        Ok(Response::new(
            Box::pin(output) as StreamResponse<LoadStatsResponse>
        ))
    }
}
