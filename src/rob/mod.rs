// Reorder buffer for memory requests.
//
// The ROB forwards requests from its top port to a bottom unit that may complete them in any
// order, and hands the responses back up strictly in the order the requests were accepted.
// Transactions live in a FIFO; a side table keyed by the ID of the forwarded request locates the
// transaction a bottom response belongs to. Entries only ever leave from the front (completion)
// or all at once (discard).
mod stats;

#[cfg(test)]
mod tests;

use std::collections::{HashMap, VecDeque};

use log::{debug, trace};
use serde::Deserialize;

use crate::base::engine::TickingComponent;
use crate::base::msg::{
    ControlKind, ControlMsg, DataReadyRsp, IdGenerator, Msg, MsgId, ReadReq, WriteDoneRsp,
    WriteReq,
};
use crate::base::port::{Connection, Port, PortId};
use crate::sim::config::Config;
use crate::timeq::Cycle;

pub use stats::RobStats;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RobConfig {
    pub buffer_size: usize,
    pub num_req_per_cycle: usize,
    pub port_buffer_size: usize,
}

impl Config for RobConfig {}

impl Default for RobConfig {
    fn default() -> Self {
        Self {
            buffer_size: 128,
            num_req_per_cycle: 4,
            port_buffer_size: 16,
        }
    }
}

impl RobConfig {
    pub fn ensure_valid(&self) {
        assert!(self.buffer_size > 0, "buffer_size must be > 0");
        assert!(self.num_req_per_cycle > 0, "num_req_per_cycle must be > 0");
        assert!(self.port_buffer_size > 0, "port_buffer_size must be > 0");
    }
}

#[derive(Debug)]
struct RobTransaction {
    req_from_top: Msg,
    req_to_bottom: Msg,
    rsp_from_bottom: Option<Msg>,
}

#[derive(Debug)]
pub struct ReorderBuffer {
    name: String,
    pub top_port: Port,
    pub bottom_port: Port,
    pub control_port: Port,
    /// Where forwarded requests are addressed.
    pub bottom_unit: PortId,

    ids: IdGenerator,
    config: RobConfig,

    transactions: VecDeque<RobTransaction>,
    // sequence number of `transactions[0]`; entry `seq` sits at `seq - front_seq`
    front_seq: u64,
    to_bottom_req_id_to_seq: HashMap<MsgId, u64>,
    is_flushing: bool,
    stats: RobStats,
}

impl ReorderBuffer {
    pub fn new(
        name: impl Into<String>,
        conn: &Connection,
        ids: IdGenerator,
        config: RobConfig,
    ) -> Self {
        config.ensure_valid();
        let name = name.into();
        Self {
            top_port: Port::new(conn, format!("{name}.TopPort"), config.port_buffer_size),
            bottom_port: Port::new(conn, format!("{name}.BottomPort"), config.port_buffer_size),
            control_port: Port::new(conn, format!("{name}.ControlPort"), config.port_buffer_size),
            bottom_unit: PortId::UNCONNECTED,
            name,
            ids,
            config,
            transactions: VecDeque::with_capacity(config.buffer_size),
            front_seq: 0,
            to_bottom_req_id_to_seq: HashMap::new(),
            is_flushing: false,
            stats: RobStats::default(),
        }
    }

    pub fn with_bottom_unit(mut self, bottom_unit: PortId) -> Self {
        self.bottom_unit = bottom_unit;
        self
    }

    pub fn is_flushing(&self) -> bool {
        self.is_flushing
    }

    pub fn num_transactions(&self) -> usize {
        self.transactions.len()
    }

    pub fn stats(&self) -> &RobStats {
        &self.stats
    }

    fn is_full(&self) -> bool {
        self.transactions.len() >= self.config.buffer_size
    }

    fn process_control_msg(&mut self, now: Cycle) -> bool {
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
            ControlKind::DiscardTransactions => self.discard_transactions(now, &ctrl),
            ControlKind::Restart => self.restart(now, &ctrl),
            kind => panic!("{}: unsupported control message {:?}", self.name, kind),
        }
    }

    fn acknowledge(&mut self, now: Cycle, ctrl: &ControlMsg) -> bool {
        let ack = ControlMsg::new(
            self.ids.generate(),
            ControlKind::NotifyDone {
                respond_to: ctrl.meta.id,
            },
        );
        let ack = Msg::from(ack).routed(self.control_port.id(), ctrl.meta.src, now);
        self.control_port.send(ack).is_ok()
    }

    fn clear_transactions(&mut self) {
        self.front_seq += self.transactions.len() as u64;
        self.transactions.clear();
        self.to_bottom_req_id_to_seq.clear();
    }

    fn discard_transactions(&mut self, now: Cycle, ctrl: &ControlMsg) -> bool {
        if !self.acknowledge(now, ctrl) {
            trace!("{}: discard ack blocked", self.name);
            return false;
        }

        debug!(
            "{}: discarding {} transactions at cycle {now}",
            self.name,
            self.transactions.len()
        );
        self.is_flushing = true;
        self.clear_transactions();
        self.control_port.retrieve();
        self.stats.record_discard();
        true
    }

    fn restart(&mut self, now: Cycle, ctrl: &ControlMsg) -> bool {
        if !self.acknowledge(now, ctrl) {
            trace!("{}: restart ack blocked", self.name);
            return false;
        }

        self.is_flushing = false;
        self.clear_transactions();
        let stale = self.top_port.drain() + self.bottom_port.drain();
        self.control_port.retrieve();
        debug!(
            "{}: restarted at cycle {now}, dropped {stale} stale messages",
            self.name
        );
        self.stats.record_restart();
        true
    }

    fn run_pipeline(&mut self, now: Cycle) -> bool {
        let mut made_progress = false;
        for _ in 0..self.config.num_req_per_cycle {
            made_progress = self.bottom_up(now) || made_progress;
        }
        for _ in 0..self.config.num_req_per_cycle {
            made_progress = self.parse_bottom() || made_progress;
        }
        for _ in 0..self.config.num_req_per_cycle {
            made_progress = self.top_down(now) || made_progress;
        }
        made_progress
    }

    fn top_down(&mut self, now: Cycle) -> bool {
        if self.is_full() {
            if !self.top_port.is_empty() {
                self.stats.record_full_stall();
            }
            return false;
        }

        let Some(req) = self.top_port.peek() else {
            return false;
        };

        let req_to_bottom = self.duplicate_req(&req).routed(
            self.bottom_port.id(),
            self.bottom_unit,
            now,
        );
        let to_bottom_id = req_to_bottom.id();
        if let Err(err) = self.bottom_port.send(req_to_bottom.clone()) {
            trace!("{}: {err}", self.name);
            self.stats.record_bottom_send_stall();
            return false;
        }

        let seq = self.front_seq + self.transactions.len() as u64;
        self.transactions.push_back(RobTransaction {
            req_from_top: req,
            req_to_bottom,
            rsp_from_bottom: None,
        });
        self.to_bottom_req_id_to_seq.insert(to_bottom_id, seq);
        self.top_port.retrieve();
        self.stats.record_accept(self.transactions.len());
        true
    }

    fn parse_bottom(&mut self) -> bool {
        let Some(rsp) = self.bottom_port.retrieve() else {
            return false;
        };
        let rsp_to = match &rsp {
            Msg::DataReady(_) | Msg::WriteDone(_) => rsp.respond_to(),
            other => panic!(
                "{}: bottom port cannot handle {}",
                self.name,
                other.kind_name()
            ),
        };

        let found = rsp_to.and_then(|id| self.to_bottom_req_id_to_seq.get(&id).copied());
        match found {
            Some(seq) => {
                let idx = (seq - self.front_seq) as usize;
                self.transactions[idx].rsp_from_bottom = Some(rsp);
            }
            None => {
                trace!("{}: dropping unmatched {}", self.name, rsp.kind_name());
                self.stats.record_unmatched();
            }
        }
        true
    }

    fn bottom_up(&mut self, now: Cycle) -> bool {
        let Some(trans) = self.transactions.front() else {
            return false;
        };
        let Some(rsp_from_bottom) = &trans.rsp_from_bottom else {
            return false;
        };

        let top_req = trans.req_from_top.meta();
        let rsp = self
            .duplicate_rsp(rsp_from_bottom, top_req.id)
            .routed(self.top_port.id(), top_req.src, now);
        if let Err(err) = self.top_port.send(rsp) {
            trace!("{}: {err}", self.name);
            self.stats.record_top_send_stall();
            return false;
        }

        if let Some(trans) = self.transactions.pop_front() {
            self.to_bottom_req_id_to_seq
                .remove(&trans.req_to_bottom.id());
        }
        self.front_seq += 1;
        self.stats.record_complete();
        true
    }

    fn duplicate_req(&self, req: &Msg) -> Msg {
        match req {
            Msg::Read(read) => Msg::from(ReadReq::new(
                self.ids.generate(),
                read.address,
                read.byte_size,
                read.pid,
            )),
            Msg::Write(write) => Msg::from(
                WriteReq::new(
                    self.ids.generate(),
                    write.address,
                    write.data.clone(),
                    write.pid,
                )
                .with_dirty_mask(write.dirty_mask.clone()),
            ),
            other => panic!("{}: top port cannot handle {}", self.name, other.kind_name()),
        }
    }

    fn duplicate_rsp(&self, rsp: &Msg, respond_to: MsgId) -> Msg {
        match rsp {
            Msg::DataReady(dr) => Msg::from(DataReadyRsp::new(
                self.ids.generate(),
                respond_to,
                dr.data.clone(),
            )),
            Msg::WriteDone(_) => Msg::from(WriteDoneRsp::new(self.ids.generate(), respond_to)),
            other => panic!("{}: cannot return {}", self.name, other.kind_name()),
        }
    }
}

pub struct RobBuilder {
    name: String,
    ids: IdGenerator,
    config: RobConfig,
    bottom_unit: PortId,
}

impl RobBuilder {
    pub fn new(name: impl Into<String>, ids: IdGenerator) -> Self {
        Self {
            name: name.into(),
            ids,
            config: RobConfig::default(),
            bottom_unit: PortId::UNCONNECTED,
        }
    }

    pub fn with_config(mut self, config: RobConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.config.buffer_size = buffer_size;
        self
    }

    pub fn with_num_req_per_cycle(mut self, num_req_per_cycle: usize) -> Self {
        self.config.num_req_per_cycle = num_req_per_cycle;
        self
    }

    pub fn with_port_buffer_size(mut self, port_buffer_size: usize) -> Self {
        self.config.port_buffer_size = port_buffer_size;
        self
    }

    pub fn with_bottom_unit(mut self, bottom_unit: PortId) -> Self {
        self.bottom_unit = bottom_unit;
        self
    }

    pub fn build(self, conn: &Connection) -> ReorderBuffer {
        ReorderBuffer::new(self.name, conn, self.ids, self.config).with_bottom_unit(self.bottom_unit)
    }
}

impl TickingComponent for ReorderBuffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, now: Cycle) -> bool {
        let mut made_progress = self.process_control_msg(now);
        if !self.is_flushing {
            made_progress = self.run_pipeline(now) || made_progress;
        }
        made_progress
    }
}
