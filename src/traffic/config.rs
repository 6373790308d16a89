use serde::Deserialize;

use crate::sim::config::Config;

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct TrafficConfig {
    pub num_reads: usize,
    pub num_writes: usize,
    /// Accesses land in `[0, max_address)`, 4-byte aligned.
    pub max_address: u64,
    /// Put a reorder buffer between the agent and the cache.
    pub use_rob: bool,
    pub port_buffer_size: usize,
}

impl Config for TrafficConfig {}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            num_reads: 10000,
            num_writes: 10000,
            max_address: 1 << 20,
            use_rob: true,
            port_buffer_size: 16,
        }
    }
}

impl TrafficConfig {
    pub fn ensure_valid(&self) {
        assert!(
            self.max_address >= 4,
            "max_address must cover at least one word"
        );
        assert!(self.port_buffer_size > 0, "port_buffer_size must be > 0");
    }
}
