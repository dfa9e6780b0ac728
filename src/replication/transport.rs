//! Peer transport seam.
//!
//! Replication is a single JSON message per operation. Production uses
//! `HttpTransport`; tests wire nodes together with `MemoryTransport` to
//! reorder and deliver deterministically without sockets.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::replication::ReplicaNode;
use crate::util::{Operation, ReplicateAck};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum TransportError {
    /// Peer consumed the request and refused it. Retrying cannot help.
    #[error("peer rejected operation: {0}")]
    Rejected(String),

    /// Peer unreachable, timed out, or answered outside 2xx/4xx. Retryable.
    #[error("peer unreachable: {0}")]
    Unreachable(String),
}

#[async_trait]
pub trait PeerTransport: Send + Sync + 'static {
    async fn replicate(
        &self,
        peer_id: &str,
        base_url: &str,
        op: &Operation,
    ) -> Result<ReplicateAck, TransportError>;
}

/// POSTs operations to `{base_url}/replicate`.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        HttpTransport {
            client: Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn replicate(
        &self,
        _peer_id: &str,
        base_url: &str,
        op: &Operation,
    ) -> Result<ReplicateAck, TransportError> {
        let url = format!("{}/replicate", base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(op)
            .send()
            .await
            .map_err(|err| TransportError::Unreachable(err.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected(format!("{status}: {body}")));
        }
        if !status.is_success() {
            return Err(TransportError::Unreachable(format!(
                "unexpected status {status}"
            )));
        }
        response
            .json::<ReplicateAck>()
            .await
            .map_err(|err| TransportError::Unreachable(err.to_string()))
    }
}

/// Routes operations straight into registered in-process nodes.
#[derive(Default)]
pub struct MemoryTransport {
    nodes: RwLock<HashMap<String, Arc<ReplicaNode>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        MemoryTransport {
            nodes: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, node: Arc<ReplicaNode>) {
        self.nodes
            .write()
            .await
            .insert(node.node_id().to_string(), node);
    }
}

#[async_trait]
impl PeerTransport for MemoryTransport {
    async fn replicate(
        &self,
        peer_id: &str,
        _base_url: &str,
        op: &Operation,
    ) -> Result<ReplicateAck, TransportError> {
        let peer = self
            .nodes
            .read()
            .await
            .get(peer_id)
            .cloned()
            .ok_or_else(|| {
                TransportError::Unreachable(format!("peer '{peer_id}' not registered"))
            })?;

        match peer.apply_replica(op.clone()).await {
            Ok(outcome) => Ok(ReplicateAck {
                accepted: true,
                delivered_now: outcome.delivered_now,
            }),
            Err(err) => Err(TransportError::Rejected(err.to_string())),
        }
    }
}
