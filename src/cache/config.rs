use serde::Deserialize;

use crate::sim::config::Config;
use crate::timeq::Cycle;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub log2_block_size: u32,
    pub total_byte_size: u64,
    pub way_associativity: usize,
    pub num_mshr_entry: usize,
    pub num_banks: usize,
    pub bank_latency: Cycle,
    /// Width of every stage: requests coalesced, looked up, started in a bank, or responded per
    /// cycle. Also the depth of the directory and bank input buffers.
    pub num_req_per_cycle: usize,
    pub max_num_concurrent_trans: usize,
    pub port_buffer_size: usize,
}

impl Config for CacheConfig {}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            log2_block_size: 6,
            total_byte_size: 4096,
            way_associativity: 2,
            num_mshr_entry: 4,
            num_banks: 1,
            bank_latency: 20,
            num_req_per_cycle: 4,
            max_num_concurrent_trans: 16,
            port_buffer_size: 16,
        }
    }
}

impl CacheConfig {
    pub fn block_size(&self) -> u64 {
        1 << self.log2_block_size
    }

    pub fn num_sets(&self) -> usize {
        (self.total_byte_size / (self.block_size() * self.way_associativity as u64)) as usize
    }

    pub fn ensure_valid(&self) {
        assert!(self.log2_block_size < 32, "log2_block_size too large");
        assert!(self.way_associativity > 0, "way_associativity must be > 0");
        assert!(
            self.total_byte_size.is_power_of_two(),
            "total_byte_size must be a power of two"
        );
        assert!(
            self.total_byte_size >= self.block_size() * self.way_associativity as u64,
            "total_byte_size must hold at least one set"
        );
        assert_eq!(
            self.total_byte_size % (self.block_size() * self.way_associativity as u64),
            0,
            "total_byte_size must be a multiple of the set size"
        );
        assert!(self.num_mshr_entry > 0, "num_mshr_entry must be > 0");
        assert!(self.num_banks > 0, "num_banks must be > 0");
        assert!(self.num_req_per_cycle > 0, "num_req_per_cycle must be > 0");
        assert!(
            self.max_num_concurrent_trans > 0,
            "max_num_concurrent_trans must be > 0"
        );
        assert!(self.port_buffer_size > 0, "port_buffer_size must be > 0");
    }
}
