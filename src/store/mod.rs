pub mod engine;
pub mod holdback;
pub mod log;
pub mod vclock;

pub use engine::{Record, Store};
pub use holdback::HoldBackQueue;
pub use log::OpLog;
pub use vclock::{CausalOrd, VectorClock};
