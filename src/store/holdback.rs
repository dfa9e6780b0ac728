//! Hold-back queue for received but not yet deliverable operations.

use crate::util::Operation;

/// Unordered set of pending remote operations, keyed by op id.
///
/// `drain_deliverable` runs to a fixed point: releasing one operation can
/// satisfy the dependencies of another already in the queue, so the scan
/// restarts after every release until a full pass frees nothing. Candidates
/// are tried in `(origin, vc[origin])` order so release order is
/// deterministic across runs.
#[derive(Debug, Default)]
pub struct HoldBackQueue {
    pending: Vec<Operation>,
}

impl HoldBackQueue {
    pub fn new() -> Self {
        HoldBackQueue {
            pending: Vec::new(),
        }
    }

    /// Insert a pending operation. Returns false if an operation with the
    /// same op id is already held.
    pub fn add(&mut self, op: Operation) -> bool {
        if self.contains(&op.op_id) {
            return false;
        }
        self.pending.push(op);
        true
    }

    pub fn contains(&self, op_id: &str) -> bool {
        self.pending.iter().any(|held| held.op_id == op_id)
    }

    /// Remove and return every operation the predicate accepts, in release
    /// order. The predicate may carry state that advances on acceptance;
    /// it is consulted again after each removal, so one release can make
    /// the next one deliverable within the same drain.
    pub fn drain_deliverable<F>(&mut self, mut is_deliverable: F) -> Vec<Operation>
    where
        F: FnMut(&Operation) -> bool,
    {
        let mut released = Vec::new();
        loop {
            let mut order: Vec<usize> = (0..self.pending.len()).collect();
            order.sort_by_key(|&i| {
                let held = &self.pending[i];
                (held.origin.clone(), held.vc.get(&held.origin))
            });

            let next = order.into_iter().find(|&i| is_deliverable(&self.pending[i]));
            match next {
                Some(idx) => released.push(self.pending.remove(idx)),
                None => break,
            }
        }
        released
    }

    pub fn snapshot(&self) -> Vec<Operation> {
        self.pending.clone()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::VectorClock;
    use crate::util::OpKind;

    fn op(origin: &str, entries: &[(&str, u64)]) -> Operation {
        let vc: VectorClock = serde_json::from_value(
            serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(node, count)| (node.to_string(), serde_json::json!(count)))
                    .collect(),
            ),
        )
        .unwrap();
        Operation {
            op_id: Operation::op_id_for(origin, vc.get(origin)),
            kind: OpKind::Update,
            key: "k".into(),
            payload: serde_json::json!({}),
            origin: origin.into(),
            vc,
        }
    }

    #[test]
    fn add_dedupes_by_op_id() {
        let mut queue = HoldBackQueue::new();
        assert!(queue.add(op("n1", &[("n1", 1)])));
        assert!(!queue.add(op("n1", &[("n1", 1)])));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn drain_releases_transitively() {
        // n2-1 depends on n1-1; n2-2 depends on n2-1. Neither is deliverable
        // against a cold clock, but delivering n1-1 frees the whole chain.
        let mut queue = HoldBackQueue::new();
        queue.add(op("n2", &[("n1", 1), ("n2", 2)]));
        queue.add(op("n2", &[("n1", 1), ("n2", 1)]));

        let mut horizon = VectorClock::zero(["n1", "n2"]).increment("n1");
        let released = queue.drain_deliverable(|held| {
            let next = horizon.get(&held.origin) + 1;
            let frontier_ok = held
                .vc
                .iter()
                .all(|(node, count)| node == held.origin || count <= horizon.get(node));
            if held.vc.get(&held.origin) == next && frontier_ok {
                horizon = horizon.merged(&held.vc);
                true
            } else {
                false
            }
        });

        let ids: Vec<_> = released.into_iter().map(|o| o.op_id).collect();
        assert_eq!(ids, vec!["n2-1", "n2-2"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_leaves_undeliverable_ops_held() {
        let mut queue = HoldBackQueue::new();
        queue.add(op("n2", &[("n1", 5), ("n2", 1)]));

        let released = queue.drain_deliverable(|_| false);
        assert!(released.is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn release_order_breaks_ties_by_origin_then_seq() {
        let mut queue = HoldBackQueue::new();
        queue.add(op("n3", &[("n3", 1)]));
        queue.add(op("n2", &[("n2", 2)]));
        queue.add(op("n2", &[("n2", 1)]));

        let released = queue.drain_deliverable(|_| true);
        let ids: Vec<_> = released.into_iter().map(|o| o.op_id).collect();
        assert_eq!(ids, vec!["n2-1", "n2-2", "n3-1"]);
    }
}
