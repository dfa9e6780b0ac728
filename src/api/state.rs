use std::sync::Arc;

use crate::api::Metrics;
use crate::replication::ReplicaNode;

#[derive(Clone)]
pub struct ApiState {
    pub node: Arc<ReplicaNode>,
    pub metrics: Metrics,
}
