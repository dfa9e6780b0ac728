use std::collections::HashSet;

use crate::util::Operation;

/// Append-only sequence of delivered operations, in delivery order.
///
/// The op id index backs duplicate detection for incoming replications.
/// Appending the same op id twice would corrupt the audit trail, so it is
/// treated as an unrecoverable invariant violation.
#[derive(Debug, Default)]
pub struct OpLog {
    entries: Vec<Operation>,
    seen: HashSet<String>,
}

impl OpLog {
    pub fn new() -> Self {
        OpLog {
            entries: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn append(&mut self, op: Operation) {
        if !self.seen.insert(op.op_id.clone()) {
            tracing::error!(op_id = %op.op_id, "operation delivered to the log twice");
            std::process::abort();
        }
        self.entries.push(op);
    }

    pub fn contains(&self, op_id: &str) -> bool {
        self.seen.contains(op_id)
    }

    pub fn snapshot(&self) -> Vec<Operation> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
