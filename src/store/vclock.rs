//! Vector clocks for causality tracking.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How two vector clocks relate under the happens-before partial order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CausalOrd {
    Less,
    Equal,
    Greater,
    Concurrent,
}

/// A per-node version vector over the replica membership.
///
/// Missing entries count as zero. Increment and merge return new values;
/// callers never mutate a clock in place, so clocks stored in the log or
/// in records cannot alias the live node clock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    entries: BTreeMap<String, u64>,
}

impl VectorClock {
    /// All-zero clock over the given membership.
    pub fn zero<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        VectorClock {
            entries: members.into_iter().map(|m| (m.into(), 0)).collect(),
        }
    }

    pub fn get(&self, node_id: &str) -> u64 {
        self.entries.get(node_id).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.entries.iter().map(|(node, count)| (node.as_str(), *count))
    }

    /// New clock with `node_id`'s entry advanced by one.
    ///
    /// Counter exhaustion cannot be represented without breaking
    /// monotonicity, so it takes the node down.
    pub fn increment(&self, node_id: &str) -> Self {
        let mut next = self.clone();
        let counter = next.entries.entry(node_id.to_string()).or_insert(0);
        *counter = match counter.checked_add(1) {
            Some(value) => value,
            None => {
                tracing::error!(node_id, "vector clock counter overflow");
                std::process::abort();
            }
        };
        next
    }

    /// Componentwise maximum of the two clocks.
    pub fn merged(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for (node, count) in &other.entries {
            let entry = merged.entries.entry(node.clone()).or_insert(0);
            *entry = (*entry).max(*count);
        }
        merged
    }

    pub fn compare(&self, other: &Self) -> CausalOrd {
        let mut some_less = false;
        let mut some_greater = false;
        for node in self.entries.keys().chain(other.entries.keys()) {
            let ours = self.get(node);
            let theirs = other.get(node);
            if ours < theirs {
                some_less = true;
            }
            if ours > theirs {
                some_greater = true;
            }
        }
        match (some_less, some_greater) {
            (false, false) => CausalOrd::Equal,
            (true, false) => CausalOrd::Less,
            (false, true) => CausalOrd::Greater,
            (true, true) => CausalOrd::Concurrent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(entries: &[(&str, u64)]) -> VectorClock {
        VectorClock {
            entries: entries
                .iter()
                .map(|(node, count)| (node.to_string(), *count))
                .collect(),
        }
    }

    #[test]
    fn zero_covers_membership() {
        let vc = VectorClock::zero(["n1", "n2", "n3"]);
        assert_eq!(vc.get("n1"), 0);
        assert_eq!(vc.get("n3"), 0);
        assert_eq!(vc.iter().count(), 3);
    }

    #[test]
    fn missing_entries_read_as_zero() {
        let vc = clock(&[("n1", 2)]);
        assert_eq!(vc.get("n2"), 0);
    }

    #[test]
    fn increment_leaves_original_untouched() {
        let vc = VectorClock::zero(["n1", "n2"]);
        let next = vc.increment("n1");
        assert_eq!(vc.get("n1"), 0);
        assert_eq!(next.get("n1"), 1);
        assert_eq!(next.get("n2"), 0);
    }

    #[test]
    fn merge_takes_componentwise_max() {
        let a = clock(&[("n1", 3), ("n2", 1)]);
        let b = clock(&[("n1", 1), ("n2", 4), ("n3", 2)]);
        let m = a.merged(&b);
        assert_eq!(m.get("n1"), 3);
        assert_eq!(m.get("n2"), 4);
        assert_eq!(m.get("n3"), 2);
    }

    #[test]
    fn compare_orders_causally_related_clocks() {
        let a = clock(&[("n1", 1), ("n2", 0)]);
        let b = clock(&[("n1", 1), ("n2", 1)]);
        assert_eq!(a.compare(&b), CausalOrd::Less);
        assert_eq!(b.compare(&a), CausalOrd::Greater);
        assert_eq!(a.compare(&a), CausalOrd::Equal);
    }

    #[test]
    fn compare_detects_concurrency() {
        let a = clock(&[("n1", 2), ("n2", 0)]);
        let b = clock(&[("n1", 1), ("n2", 1)]);
        assert_eq!(a.compare(&b), CausalOrd::Concurrent);
        assert_eq!(b.compare(&a), CausalOrd::Concurrent);
    }

    #[test]
    fn serializes_as_plain_map() {
        let vc = clock(&[("n1", 1), ("n2", 0)]);
        let json = serde_json::to_value(&vc).unwrap();
        assert_eq!(json, serde_json::json!({ "n1": 1, "n2": 0 }));
        let back: VectorClock = serde_json::from_value(json).unwrap();
        assert_eq!(back, vc);
    }
}
