/// Messages exchanged between memory components.
///
/// Every message carries a [`MsgMeta`] (ID, source port, destination port, send time). The five
/// message kinds form a closed enum, so components match on [`Msg`] exhaustively.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::base::port::PortId;
use crate::timeq::Cycle;

/// Process / address-space identifier attached to every access.
pub type Pid = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MsgId(pub u64);

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg#{}", self.0)
    }
}

/// Monotonic message ID source. Clones share the same counter, so one generator is created per
/// simulation and handed to every component that builds messages.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    next: Arc<AtomicU64>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: Arc::new(AtomicU64::new(first)),
        }
    }

    pub fn generate(&self) -> MsgId {
        MsgId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgMeta {
    pub id: MsgId,
    pub src: PortId,
    pub dst: PortId,
    pub send_time: Cycle,
}

impl MsgMeta {
    pub fn new(id: MsgId) -> Self {
        Self {
            id,
            src: PortId::UNCONNECTED,
            dst: PortId::UNCONNECTED,
            send_time: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReq {
    pub meta: MsgMeta,
    pub address: u64,
    pub byte_size: u64,
    pub pid: Pid,
}

impl ReadReq {
    pub fn new(id: MsgId, address: u64, byte_size: u64, pid: Pid) -> Self {
        Self {
            meta: MsgMeta::new(id),
            address,
            byte_size,
            pid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReq {
    pub meta: MsgMeta,
    pub address: u64,
    pub data: Vec<u8>,
    /// One flag per byte of `data`; only flagged bytes are written.
    pub dirty_mask: Vec<bool>,
    pub pid: Pid,
}

impl WriteReq {
    /// Builds a write whose every byte is dirty.
    pub fn new(id: MsgId, address: u64, data: Vec<u8>, pid: Pid) -> Self {
        let dirty_mask = vec![true; data.len()];
        Self {
            meta: MsgMeta::new(id),
            address,
            data,
            dirty_mask,
            pid,
        }
    }

    pub fn with_dirty_mask(mut self, dirty_mask: Vec<bool>) -> Self {
        assert_eq!(
            dirty_mask.len(),
            self.data.len(),
            "dirty mask must cover every data byte"
        );
        self.dirty_mask = dirty_mask;
        self
    }

    pub fn dirty_bytes(&self) -> usize {
        self.dirty_mask.iter().filter(|&&d| d).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataReadyRsp {
    pub meta: MsgMeta,
    pub respond_to: MsgId,
    pub data: Vec<u8>,
}

impl DataReadyRsp {
    pub fn new(id: MsgId, respond_to: MsgId, data: Vec<u8>) -> Self {
        Self {
            meta: MsgMeta::new(id),
            respond_to,
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteDoneRsp {
    pub meta: MsgMeta,
    pub respond_to: MsgId,
}

impl WriteDoneRsp {
    pub fn new(id: MsgId, respond_to: MsgId) -> Self {
        Self {
            meta: MsgMeta::new(id),
            respond_to,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    /// Drop all in-flight bookkeeping and stop processing until restarted.
    DiscardTransactions,
    /// Resume after a discard, dropping anything that arrived meanwhile.
    Restart,
    /// Wait for in-flight work to finish, then invalidate every cached line.
    Flush,
    /// Acknowledgement of a previous control message.
    NotifyDone { respond_to: MsgId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMsg {
    pub meta: MsgMeta,
    pub kind: ControlKind,
}

impl ControlMsg {
    pub fn new(id: MsgId, kind: ControlKind) -> Self {
        Self {
            meta: MsgMeta::new(id),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    Read(ReadReq),
    Write(WriteReq),
    DataReady(DataReadyRsp),
    WriteDone(WriteDoneRsp),
    Control(ControlMsg),
}

impl Msg {
    pub fn meta(&self) -> &MsgMeta {
        match self {
            Msg::Read(m) => &m.meta,
            Msg::Write(m) => &m.meta,
            Msg::DataReady(m) => &m.meta,
            Msg::WriteDone(m) => &m.meta,
            Msg::Control(m) => &m.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut MsgMeta {
        match self {
            Msg::Read(m) => &mut m.meta,
            Msg::Write(m) => &mut m.meta,
            Msg::DataReady(m) => &mut m.meta,
            Msg::WriteDone(m) => &mut m.meta,
            Msg::Control(m) => &mut m.meta,
        }
    }

    pub fn id(&self) -> MsgId {
        self.meta().id
    }

    /// Sets source, destination and send time in one go.
    pub fn routed(mut self, src: PortId, dst: PortId, now: Cycle) -> Self {
        let meta = self.meta_mut();
        meta.src = src;
        meta.dst = dst;
        meta.send_time = now;
        self
    }

    pub fn respond_to(&self) -> Option<MsgId> {
        match self {
            Msg::DataReady(m) => Some(m.respond_to),
            Msg::WriteDone(m) => Some(m.respond_to),
            Msg::Control(ControlMsg {
                kind: ControlKind::NotifyDone { respond_to },
                ..
            }) => Some(*respond_to),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Msg::Read(_) => "ReadReq",
            Msg::Write(_) => "WriteReq",
            Msg::DataReady(_) => "DataReadyRsp",
            Msg::WriteDone(_) => "WriteDoneRsp",
            Msg::Control(_) => "ControlMsg",
        }
    }
}

impl From<ReadReq> for Msg {
    fn from(m: ReadReq) -> Self {
        Msg::Read(m)
    }
}

impl From<WriteReq> for Msg {
    fn from(m: WriteReq) -> Self {
        Msg::Write(m)
    }
}

impl From<DataReadyRsp> for Msg {
    fn from(m: DataReadyRsp) -> Self {
        Msg::DataReady(m)
    }
}

impl From<WriteDoneRsp> for Msg {
    fn from(m: WriteDoneRsp) -> Self {
        Msg::WriteDone(m)
    }
}

impl From<ControlMsg> for Msg {
    fn from(m: ControlMsg) -> Self {
        Msg::Control(m)
    }
}
