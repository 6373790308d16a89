use std::collections::{HashMap, HashSet};

use anyhow::bail;
use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::base::engine::TickingComponent;
use crate::base::msg::{IdGenerator, Msg, MsgId, Pid, ReadReq, WriteReq};
use crate::base::port::{Connection, Port, PortId};
use crate::timeq::Cycle;
use crate::traffic::config::TrafficConfig;

const WORD_BYTES: u64 = 4;
const AGENT_PID: Pid = 1;

#[derive(Debug, Default, Clone, Serialize)]
pub struct AgentStats {
    reads_issued: u64,
    writes_issued: u64,
    reads_checked: u64,
    writes_done: u64,
    send_stalls: u64,
    address_conflicts: u64,
    last_response_cycle: Cycle,
}

impl AgentStats {
    pub fn reads_issued(&self) -> u64 {
        self.reads_issued
    }

    pub fn writes_issued(&self) -> u64 {
        self.writes_issued
    }

    pub fn reads_checked(&self) -> u64 {
        self.reads_checked
    }

    pub fn writes_done(&self) -> u64 {
        self.writes_done
    }

    pub fn send_stalls(&self) -> u64 {
        self.send_stalls
    }

    pub fn address_conflicts(&self) -> u64 {
        self.address_conflicts
    }

    pub fn last_response_cycle(&self) -> Cycle {
        self.last_response_cycle
    }
}

/// Random read/write generator that checks every read against the values it has written.
///
/// A read may legally observe any value written to its address since the last value a read
/// confirmed, so each address keeps a history that is trimmed on every successful check. The
/// agent never has two accesses to one address in flight.
#[derive(Debug)]
pub struct MemAccessAgent {
    name: String,
    pub mem_port: Port,
    pub low_module: PortId,

    ids: IdGenerator,
    rng: StdRng,
    max_address: u64,
    reads_left: usize,
    writes_left: usize,

    known_values: HashMap<u64, Vec<u32>>,
    written_addrs: Vec<u64>,
    pending_reads: HashMap<MsgId, u64>,
    pending_writes: HashMap<MsgId, u64>,
    pending_addrs: HashSet<u64>,
    stats: AgentStats,
}

impl MemAccessAgent {
    pub fn new(
        name: impl Into<String>,
        conn: &Connection,
        ids: IdGenerator,
        config: &TrafficConfig,
        seed: u64,
    ) -> Self {
        config.ensure_valid();
        let name = name.into();
        Self {
            mem_port: Port::new(conn, format!("{name}.MemPort"), config.port_buffer_size),
            low_module: PortId::UNCONNECTED,
            name,
            ids,
            rng: StdRng::seed_from_u64(seed),
            max_address: config.max_address,
            reads_left: config.num_reads,
            writes_left: config.num_writes,
            known_values: HashMap::new(),
            written_addrs: Vec::new(),
            pending_reads: HashMap::new(),
            pending_writes: HashMap::new(),
            pending_addrs: HashSet::new(),
            stats: AgentStats::default(),
        }
    }

    pub fn with_low_module(mut self, low_module: PortId) -> Self {
        self.low_module = low_module;
        self
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    pub fn reads_left(&self) -> usize {
        self.reads_left
    }

    pub fn writes_left(&self) -> usize {
        self.writes_left
    }

    pub fn num_pending(&self) -> usize {
        self.pending_reads.len() + self.pending_writes.len()
    }

    pub fn is_finished(&self) -> bool {
        self.reads_left == 0 && self.writes_left == 0 && self.num_pending() == 0
    }

    /// Fails if any request was never sent or never answered.
    pub fn ensure_all_returned(&self) -> anyhow::Result<()> {
        if self.num_pending() > 0 {
            bail!(
                "{}: {} reads and {} writes never returned",
                self.name,
                self.pending_reads.len(),
                self.pending_writes.len()
            );
        }
        if self.reads_left > 0 || self.writes_left > 0 {
            bail!(
                "{}: {} reads and {} writes were never sent",
                self.name,
                self.reads_left,
                self.writes_left
            );
        }
        Ok(())
    }

    fn process_rsp(&mut self, now: Cycle) -> bool {
        let Some(msg) = self.mem_port.retrieve() else {
            return false;
        };
        match msg {
            Msg::WriteDone(rsp) => {
                let Some(addr) = self.pending_writes.remove(&rsp.respond_to) else {
                    panic!("{}: write done for unknown {}", self.name, rsp.respond_to);
                };
                self.pending_addrs.remove(&addr);
                self.stats.writes_done += 1;
                trace!("{}: write complete @ {addr:#x}", self.name);
            }
            Msg::DataReady(rsp) => {
                let Some(addr) = self.pending_reads.remove(&rsp.respond_to) else {
                    panic!("{}: data ready for unknown {}", self.name, rsp.respond_to);
                };
                self.pending_addrs.remove(&addr);
                self.check_read_result(addr, &rsp.data);
                self.stats.reads_checked += 1;
                trace!("{}: read complete @ {addr:#x} {:?}", self.name, rsp.data);
            }
            other => panic!("{}: cannot process {}", self.name, other.kind_name()),
        }
        self.stats.last_response_cycle = now;
        true
    }

    fn check_read_result(&mut self, addr: u64, data: &[u8]) {
        let bytes: [u8; WORD_BYTES as usize] = data.try_into().unwrap_or_else(|_| {
            panic!(
                "{}: read @ {addr:#x} returned {} bytes",
                self.name,
                data.len()
            )
        });
        let value = u32::from_le_bytes(bytes);
        let history = self.known_values.entry(addr).or_default();
        match history.iter().position(|&v| v == value) {
            // older values can no longer be observed
            Some(i) => {
                history.drain(..i);
            }
            None => panic!(
                "{}: mismatch when reading {addr:#x}: got {value:#x}, expected one of {:x?}",
                self.name, history
            ),
        }
    }

    fn should_read(&mut self) -> bool {
        if self.written_addrs.is_empty() || self.reads_left == 0 {
            return false;
        }
        if self.writes_left == 0 {
            return true;
        }
        self.rng.gen_bool(0.5)
    }

    fn random_address(&mut self) -> u64 {
        self.rng.gen_range(0..self.max_address / WORD_BYTES) * WORD_BYTES
    }

    fn issue(&mut self, now: Cycle, req: Msg) -> bool {
        let addr = match &req {
            Msg::Read(read) => read.address,
            Msg::Write(write) => write.address,
            other => unreachable!("agent only issues requests, not {}", other.kind_name()),
        };
        if self.pending_addrs.contains(&addr) {
            self.stats.address_conflicts += 1;
            return false;
        }

        let id = req.id();
        let req = req.routed(self.mem_port.id(), self.low_module, now);
        let is_read = matches!(req, Msg::Read(_));
        if let Err(err) = self.mem_port.send(req) {
            trace!("{}: {err}", self.name);
            self.stats.send_stalls += 1;
            return false;
        }

        self.pending_addrs.insert(addr);
        if is_read {
            self.pending_reads.insert(id, addr);
            self.reads_left -= 1;
            self.stats.reads_issued += 1;
        } else {
            self.pending_writes.insert(id, addr);
            self.writes_left -= 1;
            self.stats.writes_issued += 1;
        }
        true
    }

    fn do_read(&mut self, now: Cycle) -> bool {
        let i = self.rng.gen_range(0..self.written_addrs.len());
        let addr = self.written_addrs[i];
        let read = ReadReq::new(self.ids.generate(), addr, WORD_BYTES, AGENT_PID);
        let issued = self.issue(now, Msg::from(read));
        if issued {
            trace!("{}: read @ {addr:#x}", self.name);
        }
        issued
    }

    fn do_write(&mut self, now: Cycle) -> bool {
        if self.writes_left == 0 {
            return false;
        }
        let addr = self.random_address();
        let value: u32 = self.rng.gen();
        let write = WriteReq::new(
            self.ids.generate(),
            addr,
            value.to_le_bytes().to_vec(),
            AGENT_PID,
        );
        if !self.issue(now, Msg::from(write)) {
            return false;
        }

        trace!("{}: write @ {addr:#x} <- {value:#x}", self.name);
        let history = self.known_values.entry(addr).or_default();
        if history.is_empty() {
            self.written_addrs.push(addr);
        }
        history.push(value);
        true
    }
}

impl TickingComponent for MemAccessAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, now: Cycle) -> bool {
        let mut made_progress = self.process_rsp(now);
        if self.reads_left == 0 && self.writes_left == 0 {
            if made_progress && self.is_finished() {
                info!("{}: all requests returned at cycle {now}", self.name);
            }
            return made_progress;
        }

        made_progress = if self.should_read() {
            self.do_read(now)
        } else {
            self.do_write(now)
        } || made_progress;
        if made_progress && self.reads_left == 0 && self.writes_left == 0 {
            debug!("{}: last request sent at cycle {now}", self.name);
        }
        made_progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::engine::Engine;
    use crate::base::msg::DataReadyRsp;
    use crate::mem::ideal::{IdealMemConfig, IdealMemController};

    fn config(num_reads: usize, num_writes: usize) -> TrafficConfig {
        TrafficConfig {
            num_reads,
            num_writes,
            max_address: 256,
            use_rob: false,
            port_buffer_size: 4,
        }
    }

    fn setup(num_reads: usize, num_writes: usize) -> (MemAccessAgent, IdealMemController) {
        let conn = Connection::new();
        let ids = IdGenerator::new();
        let dram = IdealMemController::new(
            "DRAM",
            &conn,
            ids.clone(),
            IdealMemConfig {
                latency: 5,
                max_num_transaction: 4,
                capacity: 1 << 12,
                port_buffer_size: 4,
                ..IdealMemConfig::default()
            },
        );
        let agent = MemAccessAgent::new("Agent", &conn, ids, &config(num_reads, num_writes), 7)
            .with_low_module(dram.top_port.id());
        (agent, dram)
    }

    #[test]
    fn checks_reads_against_ideal_memory() {
        let (mut agent, mut dram) = setup(200, 200);
        let mut engine = Engine::new();
        let mut comps: [&mut dyn TickingComponent; 2] = [&mut agent, &mut dram];
        engine.run(&mut comps, 100_000).unwrap();

        assert!(agent.is_finished());
        agent.ensure_all_returned().unwrap();
        assert_eq!(agent.stats().reads_checked(), 200);
        assert_eq!(agent.stats().writes_done(), 200);
    }

    #[test]
    fn first_request_is_a_write() {
        let (mut agent, dram) = setup(10, 10);
        assert!(agent.tick(0));
        assert_eq!(agent.writes_left(), 9);
        assert_eq!(agent.reads_left(), 10);
        match dram.top_port.peek() {
            Some(Msg::Write(write)) => {
                assert_eq!(write.address % 4, 0);
                assert!(write.address < 256);
                assert_eq!(write.data.len(), 4);
                assert_eq!(write.pid, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn only_reads_without_writes_never_issue() {
        let (mut agent, _dram) = setup(3, 0);
        for now in 0..10 {
            assert!(!agent.tick(now));
        }
        assert_eq!(agent.reads_left(), 3);
        assert!(agent.ensure_all_returned().is_err());
    }

    #[test]
    fn one_access_per_address_in_flight() {
        let (mut agent, dram) = setup(0, 64);
        // the memory never ticks, so nothing returns
        for now in 0..4 {
            agent.tick(now);
        }
        let mut addrs = HashSet::new();
        let mut port = dram.top_port;
        while let Some(msg) = port.retrieve() {
            match msg {
                Msg::Write(write) => assert!(addrs.insert(write.address)),
                other => panic!("unexpected {}", other.kind_name()),
            }
        }
        assert_eq!(addrs.len(), agent.num_pending());
    }

    #[test]
    fn stale_value_is_accepted_and_trims_history() {
        let (mut agent, _dram) = setup(0, 0);
        agent.known_values.insert(0x10, vec![1, 2, 3]);
        agent.check_read_result(0x10, &2u32.to_le_bytes());
        assert_eq!(agent.known_values[&0x10], vec![2, 3]);
    }

    #[test]
    #[should_panic(expected = "mismatch when reading 0x10")]
    fn unknown_value_panics() {
        let (mut agent, _dram) = setup(0, 0);
        agent.known_values.insert(0x10, vec![1, 2, 3]);
        agent.pending_reads.insert(MsgId(99), 0x10);
        let rsp = DataReadyRsp::new(MsgId(100), MsgId(99), 9u32.to_le_bytes().to_vec());
        let src = agent.mem_port.id();
        agent
            .mem_port
            .deliver(Msg::from(rsp).routed(PortId::UNCONNECTED, src, 0))
            .unwrap();
        agent.tick(0);
    }

    #[test]
    fn unanswered_requests_are_reported() {
        let (mut agent, _dram) = setup(0, 2);
        agent.tick(0);
        agent.tick(1);
        let err = agent.ensure_all_returned().unwrap_err();
        assert!(err.to_string().contains("never returned"));
    }
}
