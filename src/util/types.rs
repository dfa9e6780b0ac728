use serde::{Deserialize, Serialize};

use crate::store::VectorClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OpKind {
    Create,
    Update,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Create => "create",
            OpKind::Update => "update",
        }
    }
}

/// One replicated mutation, immutable once produced at its origin.
///
/// `vc` is the origin's clock after its own entry was incremented for this
/// write; `op_id` is `origin-seq` where seq is that entry, which makes ids
/// globally unique without coordination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub op_id: String,
    pub kind: OpKind,
    pub key: String,
    pub payload: serde_json::Value,
    pub origin: String,
    pub vc: VectorClock,
}

impl Operation {
    pub fn op_id_for(origin: &str, seq: u64) -> String {
        format!("{origin}-{seq}")
    }
}

/// Peer answer to a replication delivery.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReplicateAck {
    pub accepted: bool,
    pub delivered_now: bool,
}
