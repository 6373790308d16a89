use std::mem;

use log::trace;
use smallvec::SmallVec;

use crate::base::msg::{Msg, Pid, ReadReq, WriteReq};
use crate::cache::transaction::{Access, CoalescedTransaction, TransId, Transaction};
use crate::cache::WriteAroundCache;
use crate::timeq::Cycle;

/// Requests fold together only when all three match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GroupKey {
    is_read: bool,
    pid: Pid,
    line: u64,
}

impl WriteAroundCache {
    /// Accepts up to one cycle's worth of top requests, folding consecutive requests of the same
    /// kind to the same line into one coalesced transaction.
    pub(super) fn coalesce_stage(&mut self, now: Cycle) -> bool {
        let mut made_progress = false;
        let mut group: SmallVec<[TransId; 4]> = SmallVec::new();
        let mut key: Option<GroupKey> = None;

        for _ in 0..self.config.num_req_per_cycle {
            let Some(msg) = self.top_port.peek() else {
                break;
            };
            let access = self.to_access(msg);
            let next_key = GroupKey {
                is_read: access.is_read(),
                pid: access.pid(),
                line: self.directory.line_addr(access.address()),
            };

            if let Some(current) = key {
                if current != next_key {
                    self.commit_group(current, mem::take(&mut group));
                    key = None;
                }
            }
            if key.is_none() && self.dir_buf.len() >= self.config.num_req_per_cycle {
                trace!("{}: directory buffer full", self.name);
                break;
            }
            if self.transactions.len() >= self.config.max_num_concurrent_trans {
                self.stats.record_concurrency_stall();
                break;
            }

            self.top_port.retrieve();
            let id = self.next_trans_id();
            let is_read = access.is_read();
            self.transactions.push_back(Transaction::new(id, access));
            self.stats.record_accept(is_read, self.transactions.len());
            group.push(id);
            key = Some(next_key);
            made_progress = true;
        }

        if let Some(current) = key {
            self.commit_group(current, group);
        }
        if made_progress {
            trace!("{}: accepted requests at cycle {now}", self.name);
        }
        made_progress
    }

    fn to_access(&self, msg: Msg) -> Access {
        let access = match msg {
            Msg::Read(read) => Access::Read(read),
            Msg::Write(write) => Access::Write(write),
            other => panic!("{}: top port cannot handle {}", self.name, other.kind_name()),
        };
        let size = access.byte_size();
        if size > 0 {
            let first = self.directory.line_addr(access.address());
            let last = self.directory.line_addr(access.address() + size - 1);
            assert_eq!(
                first,
                last,
                "{}: {size}-byte access @ {:#x} crosses a cache line",
                self.name,
                access.address()
            );
        }
        access
    }

    fn commit_group(&mut self, key: GroupKey, group: SmallVec<[TransId; 4]>) {
        let id = self.next_trans_id();
        let mut post = CoalescedTransaction {
            id,
            pid: key.pid,
            ..CoalescedTransaction::default()
        };
        if key.is_read {
            post.read = Some(ReadReq::new(
                self.ids.generate(),
                key.line,
                self.config.block_size(),
                key.pid,
            ));
        } else {
            post.write = Some(self.merge_writes(key.pid, &group));
        }
        post.pre_coalesce = group;

        self.stats.record_coalesced(key.is_read);
        self.post_coalesce.push(post);
        self.dir_buf.push_back(id);
    }

    /// One write spanning every byte the group touches; later writes win on overlap and bytes
    /// nobody wrote stay clean.
    fn merge_writes(&self, pid: Pid, group: &[TransId]) -> WriteReq {
        let writes: SmallVec<[&WriteReq; 4]> = group
            .iter()
            .filter_map(|&id| match &self.pre_coalesce(id)?.access {
                Access::Write(write) => Some(write),
                Access::Read(_) => None,
            })
            .collect();

        let start = writes.iter().map(|w| w.address).min().unwrap_or(0);
        let end = writes
            .iter()
            .map(|w| w.address + w.data.len() as u64)
            .max()
            .unwrap_or(start);
        let len = (end - start) as usize;
        let mut data = vec![0; len];
        let mut dirty_mask = vec![false; len];
        for write in &writes {
            let offset = (write.address - start) as usize;
            for (i, (&byte, &dirty)) in write.data.iter().zip(&write.dirty_mask).enumerate() {
                if dirty {
                    data[offset + i] = byte;
                    dirty_mask[offset + i] = true;
                }
            }
        }

        WriteReq::new(self.ids.generate(), start, data, pid).with_dirty_mask(dirty_mask)
    }
}
