pub mod controller;
pub mod handler;
pub mod transport;

pub use controller::{DeliveryOutcome, HealthSnapshot, NodeError, ReplicaNode, WriteReceipt};
pub use handler::spawn_replicator;
pub use transport::{HttpTransport, MemoryTransport, PeerTransport, TransportError};
