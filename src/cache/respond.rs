use log::trace;

use crate::base::msg::{DataReadyRsp, Msg, WriteDoneRsp};
use crate::cache::transaction::Access;
use crate::cache::WriteAroundCache;
use crate::timeq::Cycle;

impl WriteAroundCache {
    /// Answers finished requests in the order they were accepted.
    pub(super) fn respond_stage(&mut self, now: Cycle) -> bool {
        let mut made_progress = false;
        for _ in 0..self.config.num_req_per_cycle {
            let Some(trans) = self.transactions.front() else {
                break;
            };
            if !trans.done {
                break;
            }

            let rsp = match &trans.access {
                Access::Read(read) => Msg::from(DataReadyRsp::new(
                    self.ids.generate(),
                    read.meta.id,
                    trans.data.clone(),
                )),
                Access::Write(write) => {
                    Msg::from(WriteDoneRsp::new(self.ids.generate(), write.meta.id))
                }
            }
            .routed(self.top_port.id(), trans.access.requester(), now);

            if let Err(err) = self.top_port.send(rsp) {
                trace!("{}: {err}", self.name);
                self.stats.record_top_send_stall();
                break;
            }
            self.transactions.pop_front();
            self.stats.record_response(now);
            made_progress = true;
        }
        made_progress
    }
}
