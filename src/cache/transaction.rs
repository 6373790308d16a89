use smallvec::SmallVec;

use crate::base::msg::{MsgId, Pid, ReadReq, WriteReq};
use crate::base::port::PortId;
use crate::cache::directory::BlockRef;

/// Identifies a pre- or post-coalesce transaction inside one cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TransId(pub u64);

/// The top-side request a transaction was created for.
#[derive(Debug, Clone)]
pub enum Access {
    Read(ReadReq),
    Write(WriteReq),
}

impl Access {
    pub fn address(&self) -> u64 {
        match self {
            Access::Read(r) => r.address,
            Access::Write(w) => w.address,
        }
    }

    pub fn byte_size(&self) -> u64 {
        match self {
            Access::Read(r) => r.byte_size,
            Access::Write(w) => w.data.len() as u64,
        }
    }

    pub fn pid(&self) -> Pid {
        match self {
            Access::Read(r) => r.pid,
            Access::Write(w) => w.pid,
        }
    }

    pub fn req_id(&self) -> MsgId {
        match self {
            Access::Read(r) => r.meta.id,
            Access::Write(w) => w.meta.id,
        }
    }

    pub fn requester(&self) -> PortId {
        match self {
            Access::Read(r) => r.meta.src,
            Access::Write(w) => w.meta.src,
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Access::Read(_))
    }
}

/// Pre-coalesce transaction: one per accepted top request, answered in arrival order.
#[derive(Debug)]
pub struct Transaction {
    pub id: TransId,
    pub access: Access,
    /// Bytes returned to a read once it is done.
    pub data: Vec<u8>,
    pub done: bool,
}

impl Transaction {
    pub fn new(id: TransId, access: Access) -> Self {
        Self {
            id,
            access,
            data: Vec::new(),
            done: false,
        }
    }
}

/// Post-coalesce transaction: one per line-sized read or merged write handed to the directory.
#[derive(Debug, Default)]
pub struct CoalescedTransaction {
    pub id: TransId,
    pub pid: Pid,
    pub block: Option<BlockRef>,
    /// Full-line read standing for every subsumed read.
    pub read: Option<ReadReq>,
    pub read_to_bottom: Option<MsgId>,
    /// Union of every subsumed write.
    pub write: Option<WriteReq>,
    pub write_to_bottom: Option<MsgId>,
    pub pre_coalesce: SmallVec<[TransId; 4]>,
    /// Attached to an MSHR entry; only the returning fetch retires it.
    pub mshr_held: bool,
}

impl CoalescedTransaction {
    pub fn address(&self) -> u64 {
        match (&self.read, &self.write) {
            (Some(read), _) => read.address,
            (None, Some(write)) => write.address,
            (None, None) => 0,
        }
    }
}

/// Work queued on a bank.
#[derive(Debug)]
pub enum BankJob {
    /// Serve the subsumed reads from a resident line.
    ReadHit {
        block: BlockRef,
        pre_coalesce: SmallVec<[TransId; 4]>,
    },
    /// Update a resident line with the dirty bytes of a write that is also sent below.
    Write { block: BlockRef, write: WriteReq },
    /// Install a fetched line, already merged with any writes that raced the fetch.
    WriteFetched {
        block: BlockRef,
        data: Vec<u8>,
        dirty_mask: Vec<bool>,
    },
}

impl BankJob {
    pub fn block(&self) -> BlockRef {
        match self {
            BankJob::ReadHit { block, .. }
            | BankJob::Write { block, .. }
            | BankJob::WriteFetched { block, .. } => *block,
        }
    }
}
