pub mod client;
pub mod error;
pub mod metrics;
pub mod state;

pub use client::RouterBuilder;
pub use metrics::Metrics;
pub use state::ApiState;
