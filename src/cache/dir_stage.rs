use log::{debug, trace};

use crate::base::msg::{Msg, MsgId, ReadReq, WriteReq};
use crate::cache::directory::BlockRef;
use crate::cache::transaction::BankJob;
use crate::cache::WriteAroundCache;
use crate::timeq::Cycle;

impl WriteAroundCache {
    /// Looks up coalesced transactions in arrival order, stopping at the first one that stalls.
    pub(super) fn directory_stage(&mut self, now: Cycle) -> bool {
        let mut made_progress = false;
        for _ in 0..self.config.num_req_per_cycle {
            let Some(&id) = self.dir_buf.front() else {
                break;
            };
            let Some(idx) = self.post_index(id) else {
                self.dir_buf.pop_front();
                continue;
            };

            let done = if self.post_coalesce[idx].read.is_some() {
                self.handle_read(now, idx)
            } else {
                self.handle_write(now, idx)
            };
            if !done {
                break;
            }
            self.dir_buf.pop_front();
            made_progress = true;
        }
        made_progress
    }

    fn handle_read(&mut self, now: Cycle, idx: usize) -> bool {
        let post = &self.post_coalesce[idx];
        let (post_id, pid, addr) = (post.id, post.pid, post.address());
        let line = self.directory.line_addr(addr);

        if let Some(entry) = self.mshr.query_mut(pid, line) {
            entry.requests.push(post_id);
            let block = entry.block;
            let post = &mut self.post_coalesce[idx];
            post.block = Some(block);
            post.mshr_held = true;
            self.stats.record_read_mshr_hit();
            trace!("{}: read {line:#x} joins outstanding fetch", self.name);
            return true;
        }

        match self.directory.lookup(pid, addr) {
            Some(block) => self.read_hit(idx, block),
            None => self.read_miss(now, idx, line),
        }
    }

    fn read_hit(&mut self, idx: usize, block: BlockRef) -> bool {
        if self.directory.block(block).locked {
            self.stats.record_block_busy_stall();
            return false;
        }
        let bank_id = self.bank_id(block);
        if !self.banks[bank_id].can_push() {
            self.stats.record_bank_full_stall();
            return false;
        }

        self.directory.block_mut(block).read_count += 1;
        self.directory.visit(block);
        let post = self.post_coalesce.remove(idx);
        self.banks[bank_id].push(BankJob::ReadHit {
            block,
            pre_coalesce: post.pre_coalesce,
        });
        self.stats.record_read_hit();
        true
    }

    fn read_miss(&mut self, now: Cycle, idx: usize, line: u64) -> bool {
        let victim = self.directory.find_victim(line);
        if self.directory.block(victim).is_busy() {
            self.stats.record_block_busy_stall();
            return false;
        }
        if self.mshr.is_full() {
            self.stats.record_mshr_full_stall();
            return false;
        }

        let pid = self.post_coalesce[idx].pid;
        let block_size = self.config.block_size();
        let read = ReadReq::new(self.ids.generate(), line, block_size, pid);
        let dst = self.low_module_finder.find(line);
        let msg = Msg::from(read).routed(self.bottom_port.id(), dst, now);
        let read_id = msg.id();
        if let Err(err) = self.bottom_port.send(msg) {
            trace!("{}: {err}", self.name);
            self.stats.record_bottom_send_stall();
            return false;
        }

        let post = &mut self.post_coalesce[idx];
        post.read_to_bottom = Some(read_id);
        post.block = Some(victim);
        post.mshr_held = true;
        self.mshr.add(pid, line, victim).requests.push(post.id);

        let block = self.directory.block_mut(victim);
        block.pid = pid;
        block.tag = line;
        block.valid = true;
        block.locked = true;
        self.directory.visit(victim);

        self.stats.record_read_miss(block_size);
        debug!(
            "{}: fetching line {line:#x} into set {} way {} at cycle {now}",
            self.name, victim.set_id, victim.way_id
        );
        true
    }

    fn handle_write(&mut self, now: Cycle, idx: usize) -> bool {
        let post = &self.post_coalesce[idx];
        let Some(write) = post.write.clone() else {
            panic!("{}: coalesced transaction carries no request", self.name);
        };
        let (post_id, pid) = (post.id, post.pid);
        let line = self.directory.line_addr(write.address);

        if let Some(block) = self.mshr.query(pid, line).map(|e| e.block) {
            let Some(write_id) = self.send_write_below(now, &write) else {
                return false;
            };
            if let Some(entry) = self.mshr.query_mut(pid, line) {
                entry.requests.push(post_id);
            }
            let post = &mut self.post_coalesce[idx];
            post.write_to_bottom = Some(write_id);
            post.block = Some(block);
            post.mshr_held = true;
            self.stats.record_write_mshr_hit();
            return true;
        }

        if let Some(block) = self.directory.lookup(pid, write.address) {
            if self.directory.block(block).is_busy() {
                self.stats.record_block_busy_stall();
                return false;
            }
            let bank_id = self.bank_id(block);
            if !self.banks[bank_id].can_push() {
                self.stats.record_bank_full_stall();
                return false;
            }
            let Some(write_id) = self.send_write_below(now, &write) else {
                return false;
            };

            self.directory.block_mut(block).locked = true;
            self.directory.visit(block);
            self.banks[bank_id].push(BankJob::Write { block, write });
            let post = &mut self.post_coalesce[idx];
            post.write_to_bottom = Some(write_id);
            post.block = Some(block);
            self.stats.record_write_hit();
            return true;
        }

        let Some(write_id) = self.send_write_below(now, &write) else {
            return false;
        };
        self.post_coalesce[idx].write_to_bottom = Some(write_id);
        self.stats.record_write_miss();
        true
    }

    fn send_write_below(&mut self, now: Cycle, write: &WriteReq) -> Option<MsgId> {
        let to_bottom = WriteReq::new(
            self.ids.generate(),
            write.address,
            write.data.clone(),
            write.pid,
        )
        .with_dirty_mask(write.dirty_mask.clone());
        let dirty_bytes = to_bottom.dirty_bytes();
        let dst = self.low_module_finder.find(write.address);
        let msg = Msg::from(to_bottom).routed(self.bottom_port.id(), dst, now);
        let id = msg.id();
        match self.bottom_port.send(msg) {
            Ok(()) => {
                self.stats.record_write_below(dirty_bytes);
                Some(id)
            }
            Err(err) => {
                trace!("{}: {err}", self.name);
                self.stats.record_bottom_send_stall();
                None
            }
        }
    }
}
