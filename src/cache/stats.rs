use serde::Serialize;
use std::ops::AddAssign;

use crate::timeq::Cycle;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    read_requests: u64,
    write_requests: u64,
    coalesced_reads: u64,
    coalesced_writes: u64,
    read_hits: u64,
    read_misses: u64,
    read_mshr_hits: u64,
    write_hits: u64,
    write_misses: u64,
    write_mshr_hits: u64,
    fetched_merges: u64,
    bytes_fetched: u64,
    bytes_written_below: u64,
    bank_full_stalls: u64,
    block_busy_stalls: u64,
    mshr_full_stalls: u64,
    bottom_send_stalls: u64,
    top_send_stalls: u64,
    concurrency_stalls: u64,
    unmatched_responses: u64,
    responses: u64,
    max_live_transactions: u64,
    flushes: u64,
    discards: u64,
    restarts: u64,
    last_response_cycle: Option<Cycle>,
}

impl CacheStats {
    pub fn read_requests(&self) -> u64 {
        self.read_requests
    }

    pub fn write_requests(&self) -> u64 {
        self.write_requests
    }

    pub fn coalesced_reads(&self) -> u64 {
        self.coalesced_reads
    }

    pub fn coalesced_writes(&self) -> u64 {
        self.coalesced_writes
    }

    pub fn read_hits(&self) -> u64 {
        self.read_hits
    }

    pub fn read_misses(&self) -> u64 {
        self.read_misses
    }

    pub fn read_mshr_hits(&self) -> u64 {
        self.read_mshr_hits
    }

    pub fn write_hits(&self) -> u64 {
        self.write_hits
    }

    pub fn write_misses(&self) -> u64 {
        self.write_misses
    }

    pub fn write_mshr_hits(&self) -> u64 {
        self.write_mshr_hits
    }

    pub fn fetched_merges(&self) -> u64 {
        self.fetched_merges
    }

    pub fn bytes_fetched(&self) -> u64 {
        self.bytes_fetched
    }

    pub fn bytes_written_below(&self) -> u64 {
        self.bytes_written_below
    }

    pub fn bank_full_stalls(&self) -> u64 {
        self.bank_full_stalls
    }

    pub fn block_busy_stalls(&self) -> u64 {
        self.block_busy_stalls
    }

    pub fn mshr_full_stalls(&self) -> u64 {
        self.mshr_full_stalls
    }

    pub fn bottom_send_stalls(&self) -> u64 {
        self.bottom_send_stalls
    }

    pub fn top_send_stalls(&self) -> u64 {
        self.top_send_stalls
    }

    pub fn concurrency_stalls(&self) -> u64 {
        self.concurrency_stalls
    }

    pub fn unmatched_responses(&self) -> u64 {
        self.unmatched_responses
    }

    pub fn responses(&self) -> u64 {
        self.responses
    }

    pub fn max_live_transactions(&self) -> u64 {
        self.max_live_transactions
    }

    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    pub fn discards(&self) -> u64 {
        self.discards
    }

    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    pub fn last_response_cycle(&self) -> Option<Cycle> {
        self.last_response_cycle
    }

    pub fn record_accept(&mut self, is_read: bool, live: usize) {
        if is_read {
            self.read_requests = self.read_requests.saturating_add(1);
        } else {
            self.write_requests = self.write_requests.saturating_add(1);
        }
        self.max_live_transactions = self.max_live_transactions.max(live as u64);
    }

    pub fn record_coalesced(&mut self, is_read: bool) {
        if is_read {
            self.coalesced_reads = self.coalesced_reads.saturating_add(1);
        } else {
            self.coalesced_writes = self.coalesced_writes.saturating_add(1);
        }
    }

    pub fn record_read_hit(&mut self) {
        self.read_hits = self.read_hits.saturating_add(1);
    }

    pub fn record_read_miss(&mut self, bytes: u64) {
        self.read_misses = self.read_misses.saturating_add(1);
        self.bytes_fetched = self.bytes_fetched.saturating_add(bytes);
    }

    pub fn record_read_mshr_hit(&mut self) {
        self.read_mshr_hits = self.read_mshr_hits.saturating_add(1);
    }

    pub fn record_write_hit(&mut self) {
        self.write_hits = self.write_hits.saturating_add(1);
    }

    pub fn record_write_miss(&mut self) {
        self.write_misses = self.write_misses.saturating_add(1);
    }

    pub fn record_write_mshr_hit(&mut self) {
        self.write_mshr_hits = self.write_mshr_hits.saturating_add(1);
    }

    pub fn record_write_below(&mut self, dirty_bytes: usize) {
        self.bytes_written_below = self.bytes_written_below.saturating_add(dirty_bytes as u64);
    }

    pub fn record_fetched_merge(&mut self) {
        self.fetched_merges = self.fetched_merges.saturating_add(1);
    }

    pub fn record_bank_full_stall(&mut self) {
        self.bank_full_stalls = self.bank_full_stalls.saturating_add(1);
    }

    pub fn record_block_busy_stall(&mut self) {
        self.block_busy_stalls = self.block_busy_stalls.saturating_add(1);
    }

    pub fn record_mshr_full_stall(&mut self) {
        self.mshr_full_stalls = self.mshr_full_stalls.saturating_add(1);
    }

    pub fn record_bottom_send_stall(&mut self) {
        self.bottom_send_stalls = self.bottom_send_stalls.saturating_add(1);
    }

    pub fn record_top_send_stall(&mut self) {
        self.top_send_stalls = self.top_send_stalls.saturating_add(1);
    }

    pub fn record_concurrency_stall(&mut self) {
        self.concurrency_stalls = self.concurrency_stalls.saturating_add(1);
    }

    pub fn record_unmatched(&mut self) {
        self.unmatched_responses = self.unmatched_responses.saturating_add(1);
    }

    pub fn record_response(&mut self, now: Cycle) {
        self.responses = self.responses.saturating_add(1);
        self.last_response_cycle = Some(now);
    }

    pub fn record_flush(&mut self) {
        self.flushes = self.flushes.saturating_add(1);
    }

    pub fn record_discard(&mut self) {
        self.discards = self.discards.saturating_add(1);
    }

    pub fn record_restart(&mut self) {
        self.restarts = self.restarts.saturating_add(1);
    }

    pub fn hit_rate(&self) -> f64 {
        let lookups = self.read_hits + self.read_misses + self.read_mshr_hits;
        if lookups == 0 {
            return 0.0;
        }
        (self.read_hits + self.read_mshr_hits) as f64 / lookups as f64
    }
}

impl AddAssign<&CacheStats> for CacheStats {
    fn add_assign(&mut self, other: &CacheStats) {
        self.read_requests = self.read_requests.saturating_add(other.read_requests);
        self.write_requests = self.write_requests.saturating_add(other.write_requests);
        self.coalesced_reads = self.coalesced_reads.saturating_add(other.coalesced_reads);
        self.coalesced_writes = self.coalesced_writes.saturating_add(other.coalesced_writes);
        self.read_hits = self.read_hits.saturating_add(other.read_hits);
        self.read_misses = self.read_misses.saturating_add(other.read_misses);
        self.read_mshr_hits = self.read_mshr_hits.saturating_add(other.read_mshr_hits);
        self.write_hits = self.write_hits.saturating_add(other.write_hits);
        self.write_misses = self.write_misses.saturating_add(other.write_misses);
        self.write_mshr_hits = self.write_mshr_hits.saturating_add(other.write_mshr_hits);
        self.fetched_merges = self.fetched_merges.saturating_add(other.fetched_merges);
        self.bytes_fetched = self.bytes_fetched.saturating_add(other.bytes_fetched);
        self.bytes_written_below = self
            .bytes_written_below
            .saturating_add(other.bytes_written_below);
        self.bank_full_stalls = self.bank_full_stalls.saturating_add(other.bank_full_stalls);
        self.block_busy_stalls = self.block_busy_stalls.saturating_add(other.block_busy_stalls);
        self.mshr_full_stalls = self.mshr_full_stalls.saturating_add(other.mshr_full_stalls);
        self.bottom_send_stalls = self
            .bottom_send_stalls
            .saturating_add(other.bottom_send_stalls);
        self.top_send_stalls = self.top_send_stalls.saturating_add(other.top_send_stalls);
        self.concurrency_stalls = self
            .concurrency_stalls
            .saturating_add(other.concurrency_stalls);
        self.unmatched_responses = self
            .unmatched_responses
            .saturating_add(other.unmatched_responses);
        self.responses = self.responses.saturating_add(other.responses);
        self.max_live_transactions = self.max_live_transactions.max(other.max_live_transactions);
        self.flushes = self.flushes.saturating_add(other.flushes);
        self.discards = self.discards.saturating_add(other.discards);
        self.restarts = self.restarts.saturating_add(other.restarts);
        self.last_response_cycle = match (self.last_response_cycle, other.last_response_cycle) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (None, Some(b)) => Some(b),
            (a, None) => a,
        };
    }
}

impl AddAssign<CacheStats> for CacheStats {
    fn add_assign(&mut self, other: CacheStats) {
        *self += &other;
    }
}
