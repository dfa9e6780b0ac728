//! Outbound propagation: one dispatcher task fans each local operation out
//! to a per-peer worker, so a slow or dead peer only stalls its own queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::cluster::ClusterState;
use crate::replication::{PeerTransport, TransportError};
use crate::util::Operation;

const PEER_QUEUE: usize = 1024;
const RETRY_BASE: Duration = Duration::from_millis(250);
const RETRY_CAP: Duration = Duration::from_secs(30);

/// Spawn the dispatcher and one worker per peer. Operations arriving on
/// `rx` are sent to every peer at least once; receivers deduplicate by
/// op id, so retries are safe.
pub fn spawn_replicator(
    transport: Arc<dyn PeerTransport>,
    cluster: ClusterState,
    mut rx: mpsc::Receiver<Operation>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut peer_txs = Vec::new();
        for (peer_id, base_url) in cluster.peer_urls() {
            let (tx, peer_rx) = mpsc::channel::<Operation>(PEER_QUEUE);
            peer_txs.push((peer_id.clone(), tx));
            tokio::spawn(peer_worker(
                Arc::clone(&transport),
                peer_id,
                base_url,
                peer_rx,
            ));
        }

        while let Some(op) = rx.recv().await {
            for (peer_id, tx) in &peer_txs {
                if tx.send(op.clone()).await.is_err() {
                    tracing::warn!(peer = %peer_id, op_id = %op.op_id, "peer worker gone, dropping op");
                }
            }
        }
    })
}

/// Deliver operations to one peer in order, retrying each with exponential
/// backoff until the peer consumes it. A 4xx means the peer deliberately
/// refused the message; repeating it can never succeed, so it is dropped.
async fn peer_worker(
    transport: Arc<dyn PeerTransport>,
    peer_id: String,
    base_url: String,
    mut rx: mpsc::Receiver<Operation>,
) {
    while let Some(op) = rx.recv().await {
        let mut delay = RETRY_BASE;
        loop {
            match transport.replicate(&peer_id, &base_url, &op).await {
                Ok(ack) => {
                    tracing::debug!(
                        peer = %peer_id,
                        op_id = %op.op_id,
                        delivered_now = ack.delivered_now,
                        "replicated"
                    );
                    break;
                }
                Err(TransportError::Rejected(reason)) => {
                    tracing::warn!(
                        peer = %peer_id,
                        op_id = %op.op_id,
                        %reason,
                        "peer rejected operation, dropping"
                    );
                    break;
                }
                Err(TransportError::Unreachable(reason)) => {
                    tracing::warn!(
                        peer = %peer_id,
                        op_id = %op.op_id,
                        %reason,
                        retry_in_ms = delay.as_millis() as u64,
                        "replication attempt failed"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(RETRY_CAP);
                }
            }
        }
    }
}
