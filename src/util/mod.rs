pub mod types;

pub use types::{OpKind, Operation, ReplicateAck};
