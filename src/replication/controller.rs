//! Replication controller: the only component that mutates node state.
//!
//! All four state fields (node clock, store, log, hold-back queue) live
//! behind one mutex and every entry point holds it for the whole of one
//! operation, including the hold-back drain after a delivery. Outbound
//! propagation is handed to the dispatcher only after the lock is released
//! so local clients never wait on slow peers.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use crate::cluster::ClusterState;
use crate::store::{CausalOrd, HoldBackQueue, OpLog, Record, Store, VectorClock};
use crate::util::{OpKind, Operation};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("{reason}")]
    Validation { reason: String },

    #[error("record '{key}' already exists")]
    AlreadyExists { key: String },

    #[error("record '{key}' not found")]
    NotFound { key: String },

    #[error("{reason}")]
    Protocol { reason: String },
}

impl NodeError {
    /// Stable discriminator exposed in error bodies and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            NodeError::Validation { .. } | NodeError::AlreadyExists { .. } => "validation",
            NodeError::NotFound { .. } => "not_found",
            NodeError::Protocol { .. } => "protocol",
        }
    }
}

/// Returned to the client of a local write so causality is observable.
#[derive(Debug, Clone, Serialize)]
pub struct WriteReceipt {
    pub key: String,
    pub vc: VectorClock,
}

#[derive(Debug, Clone, Copy)]
pub struct DeliveryOutcome {
    pub delivered_now: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub node_id: String,
    pub vector_clock: VectorClock,
    pub store_size: usize,
    pub queue_size: usize,
    pub log_size: usize,
}

#[derive(Debug)]
struct NodeState {
    vc: VectorClock,
    store: Store,
    log: OpLog,
    queue: HoldBackQueue,
}

pub struct ReplicaNode {
    cluster: ClusterState,
    state: Mutex<NodeState>,
    outbound: mpsc::Sender<Operation>,
}

impl ReplicaNode {
    pub fn new(cluster: ClusterState, outbound: mpsc::Sender<Operation>) -> Self {
        let vc = VectorClock::zero(cluster.members().map(str::to_string));
        ReplicaNode {
            cluster,
            state: Mutex::new(NodeState {
                vc,
                store: Store::new(),
                log: OpLog::new(),
                queue: HoldBackQueue::new(),
            }),
            outbound,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.cluster.node_id
    }

    pub fn cluster(&self) -> &ClusterState {
        &self.cluster
    }

    /// Accept a client CREATE or UPDATE, stamp it, apply it locally and
    /// queue it for propagation to every peer.
    pub async fn local_write(
        &self,
        kind: OpKind,
        key: String,
        payload: serde_json::Value,
    ) -> Result<WriteReceipt, NodeError> {
        if key.is_empty() {
            return Err(NodeError::Validation {
                reason: "key must not be empty".to_string(),
            });
        }

        let op = {
            let mut state = self.state.lock().await;
            match kind {
                OpKind::Create if state.store.get(&key).is_some() => {
                    return Err(NodeError::AlreadyExists { key });
                }
                OpKind::Update if state.store.get(&key).is_none() => {
                    return Err(NodeError::NotFound { key });
                }
                _ => {}
            }

            let vc = state.vc.increment(self.node_id());
            state.vc = vc.clone();
            let op = Operation {
                op_id: Operation::op_id_for(self.node_id(), vc.get(self.node_id())),
                kind,
                key: key.clone(),
                payload: payload.clone(),
                origin: self.node_id().to_string(),
                vc: vc.clone(),
            };
            state
                .store
                .put(key.clone(), payload, vc, self.node_id().to_string());
            state.log.append(op.clone());
            op
        };

        tracing::info!(op_id = %op.op_id, key = %op.key, kind = op.kind.as_str(), "local write applied");

        let vc = op.vc.clone();
        if self.outbound.send(op).await.is_err() {
            tracing::warn!("outbound replication channel closed, operation not propagated");
        }

        Ok(WriteReceipt { key, vc })
    }

    /// Deliver a remote operation: apply it if its causal dependencies are
    /// met (then drain the hold-back queue), otherwise hold it back.
    /// Idempotent on op id.
    pub async fn apply_replica(&self, op: Operation) -> Result<DeliveryOutcome, NodeError> {
        self.validate_replica(&op)?;

        let mut state = self.state.lock().await;

        if state.log.contains(&op.op_id) {
            tracing::debug!(op_id = %op.op_id, "duplicate delivery, already applied");
            return Ok(DeliveryOutcome {
                delivered_now: true,
            });
        }
        if state.queue.contains(&op.op_id) {
            tracing::debug!(op_id = %op.op_id, "duplicate delivery, already held");
            return Ok(DeliveryOutcome {
                delivered_now: false,
            });
        }

        if !is_deliverable(&op, &state.vc) {
            tracing::info!(
                op_id = %op.op_id,
                origin = %op.origin,
                "operation not yet deliverable, holding back"
            );
            state.queue.add(op);
            return Ok(DeliveryOutcome {
                delivered_now: false,
            });
        }

        Self::deliver(&mut state, op);

        // One release can expose the next, so the predicate tracks the clock
        // the node will have once everything accepted so far is applied.
        let mut horizon = state.vc.clone();
        let released = state.queue.drain_deliverable(|held| {
            if is_deliverable(held, &horizon) {
                horizon = horizon.merged(&held.vc);
                true
            } else {
                false
            }
        });
        for held in released {
            tracing::info!(op_id = %held.op_id, origin = %held.origin, "releasing held operation");
            Self::deliver(&mut state, held);
        }

        Ok(DeliveryOutcome {
            delivered_now: true,
        })
    }

    pub async fn record(&self, key: &str) -> Option<Record> {
        self.state.lock().await.store.get(key).cloned()
    }

    pub async fn records(&self) -> Vec<(String, Record)> {
        self.state.lock().await.store.list()
    }

    pub async fn log_snapshot(&self) -> Vec<Operation> {
        self.state.lock().await.log.snapshot()
    }

    pub async fn queue_snapshot(&self) -> Vec<Operation> {
        self.state.lock().await.queue.snapshot()
    }

    pub async fn health(&self) -> HealthSnapshot {
        let state = self.state.lock().await;
        HealthSnapshot {
            node_id: self.cluster.node_id.clone(),
            vector_clock: state.vc.clone(),
            store_size: state.store.len(),
            queue_size: state.queue.len(),
            log_size: state.log.len(),
        }
    }

    fn validate_replica(&self, op: &Operation) -> Result<(), NodeError> {
        if op.op_id.is_empty() || op.key.is_empty() {
            return Err(NodeError::Protocol {
                reason: "operation is missing op_id or key".to_string(),
            });
        }
        if !self.cluster.contains(&op.origin) {
            return Err(NodeError::Protocol {
                reason: format!("unknown origin node '{}'", op.origin),
            });
        }
        for (node, _) in op.vc.iter() {
            if !self.cluster.contains(node) {
                return Err(NodeError::Protocol {
                    reason: format!("vector clock references unknown node '{node}'"),
                });
            }
        }
        if op.vc.get(&op.origin) == 0 {
            return Err(NodeError::Protocol {
                reason: format!("vector clock has no entry for origin '{}'", op.origin),
            });
        }
        Ok(())
    }

    /// Apply one deliverable remote operation: resolve the conflict against
    /// the stored record, absorb the clock, and log it. The log records every
    /// delivered op, including writes the conflict policy discarded.
    fn deliver(state: &mut NodeState, op: Operation) {
        let take_incoming = match state.store.get(&op.key) {
            None => true,
            Some(current) => match op.vc.compare(&current.vc_written) {
                CausalOrd::Greater => true,
                CausalOrd::Less | CausalOrd::Equal => false,
                // Concurrent writes: last-writer-wins by origin id, so every
                // node picks the same winner with no extra metadata.
                CausalOrd::Concurrent => op.origin > current.origin,
            },
        };

        if take_incoming {
            state.store.put(
                op.key.clone(),
                op.payload.clone(),
                op.vc.clone(),
                op.origin.clone(),
            );
        } else {
            tracing::debug!(op_id = %op.op_id, key = %op.key, "incoming write loses, logged only");
        }

        state.vc = state.vc.merged(&op.vc);
        state.log.append(op);
    }
}

/// The causal-deliverability predicate: `op` must be the next operation the
/// node expects from its origin, and everything else `op` has seen must
/// already be delivered here.
fn is_deliverable(op: &Operation, local: &VectorClock) -> bool {
    if op.vc.get(&op.origin) != local.get(&op.origin) + 1 {
        return false;
    }
    op.vc
        .iter()
        .all(|(node, count)| node == op.origin || count <= local.get(node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cluster(node_id: &str) -> ClusterState {
        let peers = ["n1", "n2", "n3"]
            .iter()
            .map(|id| (id.to_string(), format!("http://{id}.test")))
            .collect();
        ClusterState {
            node_id: node_id.to_string(),
            listen_addr: "127.0.0.1:0".to_string(),
            peers,
        }
    }

    fn node(node_id: &str) -> ReplicaNode {
        let (tx, mut rx) = mpsc::channel(64);
        // Keep sends succeeding without a dispatcher behind them.
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
        ReplicaNode::new(cluster(node_id), tx)
    }

    fn vc(n1: u64, n2: u64, n3: u64) -> VectorClock {
        serde_json::from_value(json!({ "n1": n1, "n2": n2, "n3": n3 })).unwrap()
    }

    fn remote_op(kind: OpKind, key: &str, payload: serde_json::Value, origin: &str, clock: VectorClock) -> Operation {
        Operation {
            op_id: Operation::op_id_for(origin, clock.get(origin)),
            kind,
            key: key.to_string(),
            payload,
            origin: origin.to_string(),
            vc: clock,
        }
    }

    #[tokio::test]
    async fn create_then_update_advances_own_entry() {
        let n1 = node("n1");
        let created = n1
            .local_write(OpKind::Create, "A".into(), json!({"v": 1}))
            .await
            .unwrap();
        assert_eq!(created.vc, vc(1, 0, 0));

        let updated = n1
            .local_write(OpKind::Update, "A".into(), json!({"v": 2}))
            .await
            .unwrap();
        assert_eq!(updated.vc, vc(2, 0, 0));

        let health = n1.health().await;
        assert_eq!(health.vector_clock, vc(2, 0, 0));
        assert_eq!(health.store_size, 1);
        assert_eq!(health.log_size, 2);
        assert_eq!(health.queue_size, 0);
    }

    #[tokio::test]
    async fn create_of_existing_key_is_rejected() {
        let n1 = node("n1");
        n1.local_write(OpKind::Create, "A".into(), json!({}))
            .await
            .unwrap();
        let err = n1
            .local_write(OpKind::Create, "A".into(), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::AlreadyExists { .. }));
        // Rejected writes must not tick the clock.
        assert_eq!(n1.health().await.vector_clock, vc(1, 0, 0));
    }

    #[tokio::test]
    async fn update_of_missing_key_is_not_found() {
        let n1 = node("n1");
        let err = n1
            .local_write(OpKind::Update, "A".into(), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::NotFound { .. }));
        assert_eq!(n1.health().await.vector_clock, vc(0, 0, 0));
    }

    #[tokio::test]
    async fn empty_key_is_a_validation_error() {
        let n1 = node("n1");
        let err = n1
            .local_write(OpKind::Create, "".into(), json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn deliverable_op_is_applied_immediately() {
        let n2 = node("n2");
        let outcome = n2
            .apply_replica(remote_op(OpKind::Create, "A", json!({"v": 1}), "n1", vc(1, 0, 0)))
            .await
            .unwrap();
        assert!(outcome.delivered_now);

        let record = n2.record("A").await.unwrap();
        assert_eq!(record.vc_written, vc(1, 0, 0));
        assert_eq!(n2.health().await.vector_clock, vc(1, 0, 0));
    }

    #[tokio::test]
    async fn gap_from_origin_is_held_back() {
        let n2 = node("n2");
        let outcome = n2
            .apply_replica(remote_op(OpKind::Update, "A", json!({}), "n1", vc(2, 0, 0)))
            .await
            .unwrap();
        assert!(!outcome.delivered_now);
        assert_eq!(n2.health().await.queue_size, 1);
        assert!(n2.record("A").await.is_none());
    }

    #[tokio::test]
    async fn duplicate_delivery_changes_nothing() {
        let n2 = node("n2");
        let op = remote_op(OpKind::Create, "A", json!({"v": 1}), "n1", vc(1, 0, 0));

        n2.apply_replica(op.clone()).await.unwrap();
        let before = n2.health().await;

        let again = n2.apply_replica(op).await.unwrap();
        assert!(again.delivered_now);

        let after = n2.health().await;
        assert_eq!(after.vector_clock, before.vector_clock);
        assert_eq!(after.log_size, before.log_size);
        assert_eq!(after.store_size, before.store_size);
        assert_eq!(after.queue_size, before.queue_size);
    }

    #[tokio::test]
    async fn duplicate_of_held_op_stays_held_once() {
        let n2 = node("n2");
        let op = remote_op(OpKind::Update, "A", json!({}), "n1", vc(2, 0, 0));

        let first = n2.apply_replica(op.clone()).await.unwrap();
        let second = n2.apply_replica(op).await.unwrap();
        assert!(!first.delivered_now);
        assert!(!second.delivered_now);
        assert_eq!(n2.health().await.queue_size, 1);
    }

    #[tokio::test]
    async fn causally_newer_write_supersedes() {
        let n3 = node("n3");
        n3.apply_replica(remote_op(OpKind::Create, "A", json!({"v": 1}), "n1", vc(1, 0, 0)))
            .await
            .unwrap();
        n3.apply_replica(remote_op(OpKind::Update, "A", json!({"v": 2}), "n2", vc(1, 1, 0)))
            .await
            .unwrap();

        let record = n3.record("A").await.unwrap();
        assert_eq!(record.payload, json!({"v": 2}));
        assert_eq!(record.vc_written, vc(1, 1, 0));
    }

    #[tokio::test]
    async fn concurrent_writes_resolve_by_origin_in_both_orders() {
        // n1's second write and n2's first are concurrent; n2 wins the
        // tie-break on every node regardless of arrival order.
        let ops = |order: [usize; 2]| {
            let all = [
                remote_op(OpKind::Update, "A", json!({"by": "n1"}), "n1", vc(2, 0, 0)),
                remote_op(OpKind::Update, "A", json!({"by": "n2"}), "n2", vc(1, 1, 0)),
            ];
            order.map(|i| all[i].clone())
        };

        for order in [[0, 1], [1, 0]] {
            let n3 = node("n3");
            n3.apply_replica(remote_op(OpKind::Create, "A", json!({"v": 0}), "n1", vc(1, 0, 0)))
                .await
                .unwrap();
            for op in ops(order) {
                n3.apply_replica(op).await.unwrap();
            }
            let record = n3.record("A").await.unwrap();
            assert_eq!(record.payload, json!({"by": "n2"}), "order {order:?}");
            assert_eq!(n3.health().await.vector_clock, vc(2, 1, 0));
            assert_eq!(n3.health().await.log_size, 3);
        }
    }

    #[tokio::test]
    async fn stale_delivery_is_logged_but_discarded() {
        let n3 = node("n3");
        n3.apply_replica(remote_op(OpKind::Create, "A", json!({"v": 1}), "n1", vc(1, 0, 0)))
            .await
            .unwrap();
        n3.apply_replica(remote_op(OpKind::Update, "A", json!({"v": 2}), "n2", vc(1, 1, 0)))
            .await
            .unwrap();
        // A second n1 write that never saw n2's update, delivered late and
        // losing the tie-break ("n1" < "n2").
        n3.apply_replica(remote_op(OpKind::Update, "A", json!({"v": 3}), "n1", vc(2, 0, 0)))
            .await
            .unwrap();

        let record = n3.record("A").await.unwrap();
        assert_eq!(record.payload, json!({"v": 2}));
        assert_eq!(n3.health().await.log_size, 3);
        assert_eq!(n3.health().await.vector_clock, vc(2, 1, 0));
    }

    #[tokio::test]
    async fn unknown_origin_is_a_protocol_error() {
        let n2 = node("n2");
        let mut op = remote_op(OpKind::Create, "A", json!({}), "n1", vc(1, 0, 0));
        op.origin = "n9".to_string();
        let err = n2.apply_replica(op).await.unwrap_err();
        assert_eq!(err.kind(), "protocol");
        // Protocol errors are dropped, never enqueued.
        assert_eq!(n2.health().await.queue_size, 0);
    }

    #[tokio::test]
    async fn unknown_member_in_vc_is_a_protocol_error() {
        let n2 = node("n2");
        let clock: VectorClock =
            serde_json::from_value(json!({ "n1": 1, "n9": 4 })).unwrap();
        let op = remote_op(OpKind::Create, "A", json!({}), "n1", clock);
        let err = n2.apply_replica(op).await.unwrap_err();
        assert_eq!(err.kind(), "protocol");
    }

    #[tokio::test]
    async fn missing_origin_entry_is_a_protocol_error() {
        let n2 = node("n2");
        let op = remote_op(OpKind::Create, "A", json!({}), "n1", vc(0, 0, 0));
        let err = n2.apply_replica(op).await.unwrap_err();
        assert_eq!(err.kind(), "protocol");
    }

    #[test]
    fn deliverability_predicate() {
        let local = vc(1, 1, 0);
        let dep = |origin: &str, clock: VectorClock| {
            remote_op(OpKind::Update, "A", json!({}), origin, clock)
        };

        // Next from n1, nothing unseen from others.
        assert!(is_deliverable(&dep("n1", vc(2, 1, 0)), &local));
        // Gap in origin sequence.
        assert!(!is_deliverable(&dep("n1", vc(3, 0, 0)), &local));
        // Replay of an old origin sequence number.
        assert!(!is_deliverable(&dep("n1", vc(1, 0, 0)), &local));
        // Depends on an n3 write this node has not seen.
        assert!(!is_deliverable(&dep("n1", vc(2, 0, 1)), &local));
    }
}
