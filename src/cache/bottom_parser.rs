use log::{debug, trace};

use crate::base::msg::{DataReadyRsp, Msg, WriteDoneRsp, WriteReq};
use crate::cache::transaction::{BankJob, CoalescedTransaction, TransId};
use crate::cache::WriteAroundCache;
use crate::timeq::Cycle;

impl WriteAroundCache {
    /// Handles at most one response from below per cycle.
    pub(super) fn parse_bottom(&mut self, now: Cycle) -> bool {
        let Some(msg) = self.bottom_port.peek() else {
            return false;
        };
        match msg {
            Msg::WriteDone(done) => self.handle_write_done(done),
            Msg::DataReady(data_ready) => self.handle_data_ready(now, data_ready),
            other => panic!(
                "{}: bottom port cannot handle {}",
                self.name,
                other.kind_name()
            ),
        }
    }

    fn handle_write_done(&mut self, done: WriteDoneRsp) -> bool {
        self.bottom_port.retrieve();
        let Some(idx) = self
            .post_coalesce
            .iter()
            .position(|t| t.write_to_bottom == Some(done.respond_to))
        else {
            trace!("{}: dropping unmatched write done", self.name);
            self.stats.record_unmatched();
            return true;
        };

        let post = &mut self.post_coalesce[idx];
        let pre_coalesce = post.pre_coalesce.clone();
        if post.mshr_held {
            // the fetch it rides on retires it
            post.write_to_bottom = None;
        } else {
            self.post_coalesce.remove(idx);
        }
        self.mark_done(&pre_coalesce);
        true
    }

    fn handle_data_ready(&mut self, now: Cycle, data_ready: DataReadyRsp) -> bool {
        let Some(idx) = self
            .post_coalesce
            .iter()
            .position(|t| t.read_to_bottom == Some(data_ready.respond_to))
        else {
            self.bottom_port.retrieve();
            trace!("{}: dropping unmatched data ready", self.name);
            self.stats.record_unmatched();
            return true;
        };

        let post = &self.post_coalesce[idx];
        let Some(block) = post.block else {
            panic!("{}: fetch returned for a transaction without a block", self.name);
        };
        let (pid, line) = (post.pid, self.directory.line_addr(post.address()));
        let bank_id = self.bank_id(block);
        if !self.banks[bank_id].can_push() {
            self.stats.record_bank_full_stall();
            return false;
        }
        self.bottom_port.retrieve();

        let block_size = self.config.block_size() as usize;
        assert_eq!(
            data_ready.data.len(),
            block_size,
            "{}: fetch of line {line:#x} returned the wrong number of bytes",
            self.name
        );
        let Some(entry) = self.mshr.remove(pid, line) else {
            panic!("{}: no MSHR entry for fetched line {line:#x}", self.name);
        };

        let mut data = data_ready.data;
        let mut dirty_mask = vec![false; block_size];
        for post_id in entry.requests {
            let Some(pos) = self.post_index(post_id) else {
                continue;
            };
            let post = self.post_coalesce.remove(pos);
            if let Some(write) = &post.write {
                merge_write(line, &mut data, &mut dirty_mask, write);
                self.mark_done(&post.pre_coalesce);
            } else {
                self.finish_reads(line, &data, &post);
            }
        }

        let merged = dirty_mask.iter().any(|&d| d);
        if merged {
            self.stats.record_fetched_merge();
        }
        debug!(
            "{}: line {line:#x} arrived at cycle {now}{}",
            self.name,
            if merged { ", merged with writes" } else { "" }
        );
        self.banks[bank_id].push(BankJob::WriteFetched {
            block,
            data,
            dirty_mask,
        });
        true
    }

    fn finish_reads(&mut self, line: u64, data: &[u8], post: &CoalescedTransaction) {
        for &id in &post.pre_coalesce {
            let Some(trans) = self.pre_coalesce_mut(id) else {
                continue;
            };
            let offset = (trans.access.address() - line) as usize;
            let size = trans.access.byte_size() as usize;
            trans.data = data[offset..offset + size].to_vec();
            trans.done = true;
        }
    }

    fn mark_done(&mut self, ids: &[TransId]) {
        for &id in ids {
            if let Some(trans) = self.pre_coalesce_mut(id) {
                trans.done = true;
            }
        }
    }
}

/// Overlays the dirty bytes of `write` on a fetched line and flags them in `dirty_mask`.
fn merge_write(line: u64, data: &mut [u8], dirty_mask: &mut [bool], write: &WriteReq) {
    let offset = (write.address - line) as usize;
    assert!(
        offset + write.data.len() <= data.len(),
        "write of {} bytes @ {:#x} does not fit line {line:#x}",
        write.data.len(),
        write.address
    );
    for (i, (&byte, &dirty)) in write.data.iter().zip(&write.dirty_mask).enumerate() {
        if dirty {
            data[offset + i] = byte;
            dirty_mask[offset + i] = true;
        }
    }
}
