use std::collections::VecDeque;

use log::trace;

use crate::cache::transaction::BankJob;
use crate::cache::WriteAroundCache;
use crate::timeq::{Cycle, ServerConfig, ServiceRequest, TimedServer};

/// One bank: a bounded input buffer feeding a fixed-latency pipeline that can start `width` jobs
/// per cycle.
#[derive(Debug)]
pub(super) struct Bank {
    buffer: VecDeque<BankJob>,
    buffer_capacity: usize,
    width: usize,
    pipeline: TimedServer<BankJob>,
}

impl Bank {
    pub(super) fn new(width: usize, latency: Cycle) -> Self {
        let depth = width * (latency.max(1) as usize);
        Self {
            buffer: VecDeque::with_capacity(width),
            buffer_capacity: width,
            width,
            pipeline: TimedServer::new(ServerConfig {
                base_latency: latency,
                bytes_per_cycle: 1,
                queue_capacity: depth,
            }),
        }
    }

    pub(super) fn can_push(&self) -> bool {
        self.buffer.len() < self.buffer_capacity
    }

    pub(super) fn push(&mut self, job: BankJob) {
        assert!(self.can_push(), "bank buffer overflow");
        self.buffer.push_back(job);
    }

    pub(super) fn is_idle(&self) -> bool {
        self.buffer.is_empty() && self.pipeline.is_empty()
    }

    #[cfg(test)]
    pub(super) fn buffered(&self) -> impl Iterator<Item = &BankJob> {
        self.buffer.iter()
    }

    pub(super) fn reset(&mut self) {
        self.buffer.clear();
        self.pipeline.clear();
    }

    fn finished(&mut self, now: Cycle) -> Vec<BankJob> {
        let mut done = Vec::new();
        self.pipeline.service_ready(now, |job| done.push(job));
        done
    }

    fn start(&mut self, now: Cycle) -> bool {
        let mut started = false;
        for _ in 0..self.width {
            let Some(job) = self.buffer.pop_front() else {
                break;
            };
            if let Err(bp) = self.pipeline.try_enqueue(now, ServiceRequest::new(job, 0)) {
                self.buffer.push_front(bp.into_request().payload);
                break;
            }
            started = true;
        }
        started
    }
}

impl WriteAroundCache {
    pub(super) fn bank_stage(&mut self, now: Cycle) -> bool {
        let mut made_progress = false;
        for bank_id in 0..self.banks.len() {
            for job in self.banks[bank_id].finished(now) {
                self.finish_bank_job(job);
                made_progress = true;
            }
            made_progress = self.banks[bank_id].start(now) || made_progress;
        }
        made_progress
    }

    fn finish_bank_job(&mut self, job: BankJob) {
        match job {
            BankJob::ReadHit {
                block,
                pre_coalesce,
            } => {
                let (line, cache_address) = {
                    let b = self.directory.block(block);
                    (b.tag, b.cache_address)
                };
                for id in pre_coalesce {
                    let Some((address, size)) = self
                        .pre_coalesce(id)
                        .map(|t| (t.access.address(), t.access.byte_size()))
                    else {
                        continue;
                    };
                    let data = self
                        .data_array
                        .read(cache_address + (address - line), size)
                        .unwrap_or_else(|err| panic!("{}: {err}", self.name));
                    if let Some(trans) = self.pre_coalesce_mut(id) {
                        trans.data = data;
                        trans.done = true;
                    }
                }
                let b = self.directory.block_mut(block);
                b.read_count = b.read_count.saturating_sub(1);
            }
            BankJob::Write { block, write } => {
                let b = self.directory.block(block);
                let addr = b.cache_address + (write.address - b.tag);
                self.data_array
                    .write_masked(addr, &write.data, &write.dirty_mask)
                    .unwrap_or_else(|err| panic!("{}: {err}", self.name));
                self.directory.block_mut(block).locked = false;
            }
            BankJob::WriteFetched {
                block,
                data,
                dirty_mask,
            } => {
                let b = self.directory.block(block);
                trace!(
                    "{}: installed line {:#x}, {} bytes from merged writes",
                    self.name,
                    b.tag,
                    dirty_mask.iter().filter(|&&d| d).count()
                );
                self.data_array
                    .write(b.cache_address, &data)
                    .unwrap_or_else(|err| panic!("{}: {err}", self.name));
                self.directory.block_mut(block).locked = false;
            }
        }
    }
}
