// Write-around cache. Each stage is its own `impl WriteAroundCache` block:
//
//   top port -> coalescer -> directory -> banks
//                               |           ^
//                               v           |
//                          bottom port -> bottom parser
//   respond stage <- pre-coalesce transactions marked done
//
// Writes never allocate a line on their own; lines are installed only by fetches, together with
// any write attached to the fetch's MSHR entry while it was outstanding.
mod bank;
mod bottom_parser;
mod coalescer;
mod config;
mod control;
mod dir_stage;
pub mod directory;
pub mod mshr;
mod respond;
mod stats;
pub mod transaction;


use std::collections::VecDeque;

use crate::base::engine::TickingComponent;
use crate::base::msg::IdGenerator;
use crate::base::port::{Connection, Port};
use crate::mem::low_module::LowModuleFinder;
use crate::mem::storage::Storage;
use crate::timeq::Cycle;

use bank::Bank;
use directory::{BlockRef, Directory};
use mshr::MshrTable;
use transaction::{CoalescedTransaction, TransId, Transaction};

pub use config::CacheConfig;
pub use stats::CacheStats;

#[derive(Debug)]
pub struct WriteAroundCache {
    name: String,
    pub top_port: Port,
    pub bottom_port: Port,
    pub control_port: Port,

    ids: IdGenerator,
    config: CacheConfig,
    low_module_finder: Box<dyn LowModuleFinder>,

    directory: Directory,
    mshr: MshrTable,
    data_array: Storage,
    banks: Vec<Bank>,
    dir_buf: VecDeque<TransId>,

    // pre-coalesce, in arrival order; ids ascend front to back
    transactions: VecDeque<Transaction>,
    post_coalesce: Vec<CoalescedTransaction>,
    next_trans_id: u64,

    is_paused: bool,
    flush_pending: bool,
    stats: CacheStats,
}

impl WriteAroundCache {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    /// Top requests accepted but not yet answered.
    pub fn num_live_transactions(&self) -> usize {
        self.transactions.len()
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Nothing accepted, queued, or in flight anywhere in the cache.
    pub fn is_idle(&self) -> bool {
        self.transactions.is_empty()
            && self.post_coalesce.is_empty()
            && self.dir_buf.is_empty()
            && self.mshr.is_empty()
            && self.banks.iter().all(Bank::is_idle)
    }

    fn next_trans_id(&mut self) -> TransId {
        let id = TransId(self.next_trans_id);
        self.next_trans_id += 1;
        id
    }

    fn pre_coalesce(&self, id: TransId) -> Option<&Transaction> {
        let idx = self.transactions.binary_search_by_key(&id, |t| t.id).ok()?;
        self.transactions.get(idx)
    }

    fn pre_coalesce_mut(&mut self, id: TransId) -> Option<&mut Transaction> {
        let idx = self.transactions.binary_search_by_key(&id, |t| t.id).ok()?;
        self.transactions.get_mut(idx)
    }

    fn post_index(&self, id: TransId) -> Option<usize> {
        self.post_coalesce.iter().position(|t| t.id == id)
    }

    fn bank_id(&self, block: BlockRef) -> usize {
        (block.set_id * self.directory.num_ways() + block.way_id) % self.banks.len()
    }
}

impl TickingComponent for WriteAroundCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, now: Cycle) -> bool {
        let mut made_progress = self.control_stage(now);
        if self.is_paused {
            return made_progress;
        }

        // back to front, so a request moves at most one stage per cycle
        made_progress = self.respond_stage(now) || made_progress;
        made_progress = self.parse_bottom(now) || made_progress;
        made_progress = self.bank_stage(now) || made_progress;
        made_progress = self.directory_stage(now) || made_progress;
        if !self.flush_pending {
            made_progress = self.coalesce_stage(now) || made_progress;
        }

        made_progress || self.banks.iter().any(|b| !b.is_idle())
    }
}

pub struct CacheBuilder {
    name: String,
    config: CacheConfig,
    ids: IdGenerator,
    low_module_finder: Option<Box<dyn LowModuleFinder>>,
}

impl CacheBuilder {
    pub fn new(name: impl Into<String>, ids: IdGenerator) -> Self {
        Self {
            name: name.into(),
            config: CacheConfig::default(),
            ids,
            low_module_finder: None,
        }
    }

    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_log2_block_size(mut self, log2_block_size: u32) -> Self {
        self.config.log2_block_size = log2_block_size;
        self
    }

    pub fn with_total_byte_size(mut self, total_byte_size: u64) -> Self {
        self.config.total_byte_size = total_byte_size;
        self
    }

    pub fn with_way_associativity(mut self, way_associativity: usize) -> Self {
        self.config.way_associativity = way_associativity;
        self
    }

    pub fn with_num_mshr_entry(mut self, num_mshr_entry: usize) -> Self {
        self.config.num_mshr_entry = num_mshr_entry;
        self
    }

    pub fn with_num_banks(mut self, num_banks: usize) -> Self {
        self.config.num_banks = num_banks;
        self
    }

    pub fn with_bank_latency(mut self, bank_latency: Cycle) -> Self {
        self.config.bank_latency = bank_latency;
        self
    }

    pub fn with_num_req_per_cycle(mut self, num_req_per_cycle: usize) -> Self {
        self.config.num_req_per_cycle = num_req_per_cycle;
        self
    }

    pub fn with_max_num_concurrent_trans(mut self, max_num_concurrent_trans: usize) -> Self {
        self.config.max_num_concurrent_trans = max_num_concurrent_trans;
        self
    }

    pub fn with_low_module_finder(mut self, finder: impl LowModuleFinder + 'static) -> Self {
        self.low_module_finder = Some(Box::new(finder));
        self
    }

    pub fn build(self, conn: &Connection) -> WriteAroundCache {
        let config = self.config;
        config.ensure_valid();
        let name = self.name;
        let Some(low_module_finder) = self.low_module_finder else {
            panic!("{name}: no low module finder configured");
        };

        let block_size = config.block_size();
        let banks = (0..config.num_banks)
            .map(|_| Bank::new(config.num_req_per_cycle, config.bank_latency))
            .collect();
        WriteAroundCache {
            top_port: Port::new(conn, format!("{name}.TopPort"), config.port_buffer_size),
            bottom_port: Port::new(conn, format!("{name}.BottomPort"), config.port_buffer_size),
            control_port: Port::new(conn, format!("{name}.ControlPort"), config.port_buffer_size),
            ids: self.ids,
            low_module_finder,
            directory: Directory::new(config.num_sets(), config.way_associativity, block_size),
            mshr: MshrTable::new(config.num_mshr_entry),
            data_array: Storage::with_unit_size(config.total_byte_size, block_size),
            banks,
            dir_buf: VecDeque::with_capacity(config.num_req_per_cycle),
            transactions: VecDeque::new(),
            post_coalesce: Vec::new(),
            next_trans_id: 1,
            is_paused: false,
            flush_pending: false,
            stats: CacheStats::default(),
            config,
            name,
        }
    }
}
