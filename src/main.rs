use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::{net::TcpListener, sync::mpsc};
use tracing_subscriber::EnvFilter;

use causalkv::api::{ApiState, Metrics, RouterBuilder};
use causalkv::cluster::ClusterState;
use causalkv::config::CliArgs;
use causalkv::replication::{spawn_replicator, HttpTransport, ReplicaNode};
use causalkv::util::Operation;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = CliArgs::parse();
    let cluster = ClusterState::try_from(args)?;
    let addr: SocketAddr = cluster.listen_addr.parse()?;

    let (rep_tx, rep_rx) = mpsc::channel::<Operation>(4096);
    let node = Arc::new(ReplicaNode::new(cluster.clone(), rep_tx));
    spawn_replicator(Arc::new(HttpTransport::new()), cluster.clone(), rep_rx);

    let state = ApiState {
        node,
        metrics: Metrics::new(),
    };

    tracing::info!(
        node_id = %cluster.node_id,
        peers = cluster.peer_urls().len(),
        "node starting"
    );

    let app = RouterBuilder::with_state(state);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
