use log::{debug, info, trace};

use crate::base::msg::{ControlKind, ControlMsg, Msg};
use crate::cache::WriteAroundCache;
use crate::timeq::Cycle;

impl WriteAroundCache {
    /// Serves the head of the control port. A command only commits once its acknowledgement has
    /// been sent; otherwise it is retried unchanged next cycle.
    pub(super) fn control_stage(&mut self, now: Cycle) -> bool {
        let Some(msg) = self.control_port.peek() else {
            return false;
        };
        let ctrl = match msg {
            Msg::Control(ctrl) => ctrl,
            other => panic!(
                "{}: control port cannot handle {}",
                self.name,
                other.kind_name()
            ),
        };

        match ctrl.kind {
            ControlKind::DiscardTransactions => {
                if !self.acknowledge(now, &ctrl) {
                    return false;
                }
                self.hard_reset();
                self.is_paused = true;
                self.stats.record_discard();
                info!("{}: transactions discarded at cycle {now}", self.name);
            }
            ControlKind::Restart => {
                if !self.acknowledge(now, &ctrl) {
                    return false;
                }
                let stale = self.top_port.drain() + self.bottom_port.drain();
                self.is_paused = false;
                self.stats.record_restart();
                info!(
                    "{}: restarted at cycle {now}, dropped {stale} stale messages",
                    self.name
                );
            }
            ControlKind::Flush => {
                if !self.is_idle() {
                    self.flush_pending = true;
                    return false;
                }
                if !self.acknowledge(now, &ctrl) {
                    return false;
                }
                self.directory.reset();
                self.flush_pending = false;
                self.stats.record_flush();
                info!("{}: flushed at cycle {now}", self.name);
            }
            kind => panic!("{}: unsupported control message {:?}", self.name, kind),
        }

        self.control_port.retrieve();
        true
    }

    fn acknowledge(&mut self, now: Cycle, ctrl: &ControlMsg) -> bool {
        let ack = ControlMsg::new(
            self.ids.generate(),
            ControlKind::NotifyDone {
                respond_to: ctrl.meta.id,
            },
        );
        let ack = Msg::from(ack).routed(self.control_port.id(), ctrl.meta.src, now);
        match self.control_port.send(ack) {
            Ok(()) => true,
            Err(err) => {
                trace!("{}: {err}", self.name);
                false
            }
        }
    }

    /// Forgets every request and every cached line, including whatever is queued in the ports.
    fn hard_reset(&mut self) {
        let dropped = self.top_port.drain() + self.bottom_port.drain();
        debug!(
            "{}: dropping {} transactions and {dropped} queued messages",
            self.name,
            self.transactions.len()
        );
        self.dir_buf.clear();
        for bank in &mut self.banks {
            bank.reset();
        }
        self.transactions.clear();
        self.post_coalesce.clear();
        self.mshr.reset();
        self.directory.reset();
        self.flush_pending = false;
    }
}
