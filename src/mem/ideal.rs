use log::{debug, trace};
use serde::Deserialize;

use crate::base::engine::TickingComponent;
use crate::base::msg::{DataReadyRsp, IdGenerator, Msg, ReadReq, WriteDoneRsp, WriteReq};
use crate::base::port::{Connection, Port, PortId};
use crate::mem::storage::Storage;
use crate::sim::config::Config;
use crate::timeq::{Cycle, ServerConfig, ServiceRequest, TimedServer};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct IdealMemConfig {
    pub latency: Cycle,
    pub max_num_transaction: usize,
    pub capacity: u64,
    pub port_buffer_size: usize,
    /// Controllers the address space is interleaved over.
    pub num_channels: usize,
    pub interleaving_size: u64,
}

impl Config for IdealMemConfig {}

impl Default for IdealMemConfig {
    fn default() -> Self {
        Self {
            latency: 100,
            max_num_transaction: 8,
            capacity: 4 << 30,
            port_buffer_size: 16,
            num_channels: 1,
            interleaving_size: 4096,
        }
    }
}

#[derive(Debug)]
enum MemJob {
    Read(ReadReq),
    Write(WriteReq),
}

impl MemJob {
    fn reply_to(&self) -> PortId {
        match self {
            MemJob::Read(r) => r.meta.src,
            MemJob::Write(w) => w.meta.src,
        }
    }
}

/// Memory controller that answers every request after a fixed number of cycles, with no
/// contention other than a cap on concurrent transactions.
#[derive(Debug)]
pub struct IdealMemController {
    name: String,
    pub top_port: Port,
    pub storage: Storage,
    ids: IdGenerator,
    server: TimedServer<MemJob>,
}

impl IdealMemController {
    pub fn new(
        name: impl Into<String>,
        conn: &Connection,
        ids: IdGenerator,
        config: IdealMemConfig,
    ) -> Self {
        let name = name.into();
        assert!(config.max_num_transaction > 0, "max_num_transaction must be > 0");
        let top_port = Port::new(conn, format!("{name}.TopPort"), config.port_buffer_size);
        Self {
            name,
            top_port,
            storage: Storage::new(config.capacity),
            ids,
            server: TimedServer::new(ServerConfig {
                base_latency: config.latency,
                bytes_per_cycle: 1,
                queue_capacity: config.max_num_transaction,
            }),
        }
    }

    pub fn num_inflight(&self) -> usize {
        self.server.len()
    }

    fn respond(&mut self, now: Cycle) -> bool {
        let top_port = &self.top_port;
        let Some(job) = self
            .server
            .pop_ready_if(now, |job| top_port.can_send(job.reply_to()))
        else {
            return false;
        };

        let src = self.top_port.id();
        let rsp: Msg = match job {
            MemJob::Read(read) => {
                let data = self
                    .storage
                    .read(read.address, read.byte_size)
                    .unwrap_or_else(|err| panic!("{}: {err}", self.name));
                trace!("{}: read {:#x} -> {:?}", self.name, read.address, data);
                Msg::from(DataReadyRsp::new(self.ids.generate(), read.meta.id, data)).routed(
                    src,
                    read.meta.src,
                    now,
                )
            }
            MemJob::Write(write) => {
                self.storage
                    .write_masked(write.address, &write.data, &write.dirty_mask)
                    .unwrap_or_else(|err| panic!("{}: {err}", self.name));
                trace!("{}: write {:#x} <- {:?}", self.name, write.address, write.data);
                Msg::from(WriteDoneRsp::new(self.ids.generate(), write.meta.id)).routed(
                    src,
                    write.meta.src,
                    now,
                )
            }
        };

        if let Err(err) = self.top_port.send(rsp) {
            panic!("{}: {err} after can_send succeeded", self.name);
        }
        true
    }

    fn accept(&mut self, now: Cycle) -> bool {
        if !self.server.can_accept() {
            return false;
        }
        let Some(msg) = self.top_port.retrieve() else {
            return false;
        };

        let job = match msg {
            Msg::Read(read) => MemJob::Read(read),
            Msg::Write(write) => MemJob::Write(write),
            other => panic!("{}: cannot handle {}", self.name, other.kind_name()),
        };
        debug!("{}: accepted request at cycle {now}", self.name);
        if self
            .server
            .try_enqueue(now, ServiceRequest::new(job, 0))
            .is_err()
        {
            panic!("{}: server rejected after can_accept", self.name);
        }
        true
    }
}

impl TickingComponent for IdealMemController {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, now: Cycle) -> bool {
        let mut made_progress = false;
        while self.respond(now) {
            made_progress = true;
        }
        made_progress = self.accept(now) || made_progress;
        // in-flight requests are still counting down
        made_progress || !self.server.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::msg::MsgId;

    fn setup(latency: Cycle) -> (IdealMemController, Port, IdGenerator) {
        let conn = Connection::new();
        let ids = IdGenerator::new();
        let config = IdealMemConfig {
            latency,
            max_num_transaction: 2,
            capacity: 1 << 20,
            port_buffer_size: 4,
            ..IdealMemConfig::default()
        };
        let dram = IdealMemController::new("DRAM", &conn, ids.clone(), config);
        let agent = Port::new(&conn, "Agent", 4);
        (dram, agent, ids)
    }

    fn wait_for_rsp(dram: &mut IdealMemController, agent: &mut Port, start: Cycle) -> (Msg, Cycle) {
        for now in start..start + 1000 {
            dram.tick(now);
            if let Some(msg) = agent.retrieve() {
                return (msg, now);
            }
        }
        panic!("no response within 1000 cycles");
    }

    #[test]
    fn read_responds_after_latency() {
        let (mut dram, mut agent, ids) = setup(10);
        dram.storage.write(0x100, &[1, 2, 3, 4]).unwrap();
        let read = ReadReq::new(ids.generate(), 0x100, 4, 1);
        let read_id = read.meta.id;
        agent
            .send(Msg::from(read).routed(agent.id(), dram.top_port.id(), 0))
            .unwrap();

        let (rsp, at) = wait_for_rsp(&mut dram, &mut agent, 0);
        assert_eq!(at, 10);
        match rsp {
            Msg::DataReady(dr) => {
                assert_eq!(dr.respond_to, read_id);
                assert_eq!(dr.data, vec![1, 2, 3, 4]);
            }
            other => panic!("unexpected {}", other.kind_name()),
        }
    }

    #[test]
    fn masked_write_updates_only_dirty_bytes() {
        let (mut dram, mut agent, ids) = setup(1);
        dram.storage.write(0x200, &[5, 5, 5, 5]).unwrap();
        let write = WriteReq::new(ids.generate(), 0x200, vec![7, 7, 7, 7], 1)
            .with_dirty_mask(vec![true, false, false, true]);
        agent
            .send(Msg::from(write).routed(agent.id(), dram.top_port.id(), 0))
            .unwrap();

        let (rsp, _) = wait_for_rsp(&mut dram, &mut agent, 0);
        assert!(matches!(rsp, Msg::WriteDone(_)));
        assert_eq!(dram.storage.read(0x200, 4).unwrap(), vec![7, 5, 5, 7]);
    }

    #[test]
    fn transaction_cap_leaves_requests_in_port() {
        let (mut dram, mut agent, ids) = setup(50);
        for i in 0..3 {
            let read = ReadReq::new(ids.generate(), 0x40 * i, 4, 1);
            agent
                .send(Msg::from(read).routed(agent.id(), dram.top_port.id(), 0))
                .unwrap();
        }
        for now in 0..5 {
            dram.tick(now);
        }
        assert_eq!(dram.num_inflight(), 2);
        assert_eq!(dram.top_port.len(), 1);
    }

    #[test]
    #[should_panic(expected = "cannot handle WriteDoneRsp")]
    fn responses_are_not_requests() {
        let (mut dram, mut agent, ids) = setup(1);
        let bogus = WriteDoneRsp::new(ids.generate(), MsgId(1));
        agent
            .send(Msg::from(bogus).routed(agent.id(), dram.top_port.id(), 0))
            .unwrap();
        dram.tick(0);
    }
}
