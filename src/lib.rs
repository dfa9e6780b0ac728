//! A single node of a causally consistent replicated key-value store.
//!
//! Every node in a statically configured replica group accepts client
//! writes, stamps them with a vector clock, and propagates them to all
//! peers. Incoming remote operations are applied in causal order: an
//! operation whose dependencies have not arrived yet waits in a hold-back
//! queue until the delivery of its predecessors releases it.

pub mod api;
pub mod cluster;
pub mod config;
pub mod replication;
pub mod store;
pub mod util;
