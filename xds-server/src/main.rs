use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::signal::unix::{signal as unix_signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};
use xds_server::bootstrap;
use xds_server::cache::resources::ResourceCache;
use xds_server::server;

#[derive(Parser, Debug)]
#[command(about = "xDS management server")]
struct Args {
    /// Node ID this management server answers for.
    #[arg(long = "nodeID", default_value = "test-id")]
    node_id: String,

    /// Management server listen address.
    #[arg(long, default_value = "[::]:18000")]
    addr: SocketAddr,

    /// Cluster configuration directory.
    #[arg(long, default_value = ".")]
    conf: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let cache = Arc::new(ResourceCache::new());
    let count = match bootstrap::load_clusters(&args.conf, &cache).await {
        Ok(count) => count,
        Err(err) => {
            error!(%err, conf = %args.conf.display(), "failed to load cluster configuration");
            process::exit(1);
        }
    };
    info!(
        clusters = count,
        conf = %args.conf.display(),
        node_id = %args.node_id,
        "initialized cache"
    );

    let mut term = match unix_signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(err) => {
            error!(%err, "failed to install SIGTERM handler");
            process::exit(1);
        }
    };
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::select! {
            _ = signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
        info!("shutting down");
        let _ = shutdown_tx.send(true);
    });

    if let Err(err) = server::run(args.addr, cache, None, shutdown_rx).await {
        error!(%err, "management server failed");
        process::exit(1);
    }
}
