use smallvec::SmallVec;

use crate::base::msg::Pid;
use crate::cache::directory::BlockRef;
use crate::cache::transaction::TransId;

/// One outstanding line fetch and the coalesced transactions waiting on it, in arrival order.
#[derive(Debug)]
pub struct MshrEntry {
    pub pid: Pid,
    pub tag: u64,
    pub block: BlockRef,
    pub requests: SmallVec<[TransId; 4]>,
}

#[derive(Debug)]
pub struct MshrTable {
    capacity: usize,
    entries: Vec<MshrEntry>,
}

impl MshrTable {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "MSHR needs at least one entry");
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn query(&self, pid: Pid, tag: u64) -> Option<&MshrEntry> {
        self.entries.iter().find(|e| e.pid == pid && e.tag == tag)
    }

    pub fn query_mut(&mut self, pid: Pid, tag: u64) -> Option<&mut MshrEntry> {
        self.entries.iter_mut().find(|e| e.pid == pid && e.tag == tag)
    }

    /// Opens an entry for a new fetch. Callers check `is_full` and `query` first; a second fetch
    /// of the same line is a bug.
    pub fn add(&mut self, pid: Pid, tag: u64, block: BlockRef) -> &mut MshrEntry {
        assert!(
            self.query(pid, tag).is_none(),
            "MSHR already tracks line {tag:#x} of pid {pid}"
        );
        assert!(!self.is_full(), "MSHR is full");
        self.entries.push(MshrEntry {
            pid,
            tag,
            block,
            requests: SmallVec::new(),
        });
        let last = self.entries.len() - 1;
        &mut self.entries[last]
    }

    pub fn remove(&mut self, pid: Pid, tag: u64) -> Option<MshrEntry> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.pid == pid && e.tag == tag)?;
        Some(self.entries.swap_remove(idx))
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(way_id: usize) -> BlockRef {
        BlockRef { set_id: 0, way_id }
    }

    #[test]
    fn new_table_is_empty() {
        let table = MshrTable::new(4);
        assert!(table.is_empty());
        assert!(table.query(1, 0x100).is_none());
    }

    #[test]
    fn entries_are_keyed_by_pid_and_tag() {
        let mut table = MshrTable::new(4);
        table.add(1, 0x100, block(0));
        assert!(table.query(1, 0x100).is_some());
        assert!(table.query(2, 0x100).is_none());
        assert!(table.query(1, 0x140).is_none());
    }

    #[test]
    fn requests_attach_in_order() {
        let mut table = MshrTable::new(1);
        table.add(1, 0x100, block(1)).requests.push(TransId(3));
        for id in [5, 4] {
            table
                .query_mut(1, 0x100)
                .expect("entry exists")
                .requests
                .push(TransId(id));
        }
        let entry = table.remove(1, 0x100).unwrap();
        assert_eq!(entry.block, block(1));
        assert_eq!(entry.requests.as_slice(), &[TransId(3), TransId(5), TransId(4)]);
        assert!(table.is_empty());
    }

    #[test]
    fn remove_frees_a_slot() {
        let mut table = MshrTable::new(1);
        table.add(1, 0x0, block(0));
        assert!(table.is_full());
        assert!(table.remove(1, 0x40).is_none());
        table.remove(1, 0x0).unwrap();
        assert!(!table.is_full());
        table.add(1, 0x40, block(0));
    }

    #[test]
    #[should_panic(expected = "MSHR is full")]
    fn adding_past_capacity_panics() {
        let mut table = MshrTable::new(1);
        table.add(1, 0x0, block(0));
        table.add(1, 0x40, block(1));
    }

    #[test]
    #[should_panic(expected = "already tracks")]
    fn duplicate_fetch_panics() {
        let mut table = MshrTable::new(2);
        table.add(1, 0x0, block(0));
        table.add(1, 0x0, block(1));
    }

    #[test]
    fn fill_and_drain_repeatedly() {
        let mut table = MshrTable::new(4);
        for round in 0..50 {
            for line in 0..4u64 {
                table.add(1, line * 64, block(line as usize));
            }
            assert!(table.is_full(), "round {round}");
            for line in 0..4u64 {
                assert!(table.remove(1, line * 64).is_some(), "round {round}");
            }
        }
        table.add(1, 0, block(0));
        table.reset();
        assert!(table.is_empty());
    }
}
