use std::collections::HashMap;

use crate::store::VectorClock;

/// Current value of one record plus the clock and writer of the operation
/// that produced it. The writer id is what the concurrent-write tie-break
/// compares against.
#[derive(Debug, Clone)]
pub struct Record {
    pub payload: serde_json::Value,
    pub vc_written: VectorClock,
    pub origin: String,
}

/// Key to record map. Conflict resolution happens in the replication
/// controller before `put` is called; `put` itself always overwrites.
#[derive(Debug, Default)]
pub struct Store {
    inner: HashMap<String, Record>,
}

impl Store {
    pub fn new() -> Self {
        Store {
            inner: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.inner.get(key)
    }

    pub fn put(&mut self, key: String, payload: serde_json::Value, vc: VectorClock, origin: String) {
        self.inner.insert(
            key,
            Record {
                payload,
                vc_written: vc,
                origin,
            },
        );
    }

    /// Snapshot of every record, ordered by key.
    pub fn list(&self) -> Vec<(String, Record)> {
        let mut records: Vec<_> = self
            .inner
            .iter()
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        records
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
