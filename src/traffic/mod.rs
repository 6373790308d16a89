// Synthetic traffic used to exercise the memory hierarchy end to end.
pub mod agent;
pub mod config;

pub use agent::{AgentStats, MemAccessAgent};
pub use config::TrafficConfig;
