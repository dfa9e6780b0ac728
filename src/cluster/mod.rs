pub mod state;

pub use state::ClusterState;
