use crate::base::msg::Pid;

/// Position of a block in the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef {
    pub set_id: usize,
    pub way_id: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    pub pid: Pid,
    /// Line-aligned address of the cached line.
    pub tag: u64,
    pub set_id: usize,
    pub way_id: usize,
    /// Offset of the line in the data array.
    pub cache_address: u64,
    pub valid: bool,
    /// Set while a fill or a bank write is pending on the block.
    pub locked: bool,
    /// Bank reads in flight against the block.
    pub read_count: u32,
}

impl Block {
    pub fn block_ref(&self) -> BlockRef {
        BlockRef {
            set_id: self.set_id,
            way_id: self.way_id,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.locked || self.read_count > 0
    }
}

/// Tag store of a set-associative cache with per-set LRU ordering.
#[derive(Debug)]
pub struct Directory {
    num_sets: usize,
    num_ways: usize,
    block_size: u64,
    sets: Vec<Vec<Block>>,
    // most recently used way first
    lru: Vec<Vec<usize>>,
}

impl Directory {
    pub fn new(num_sets: usize, num_ways: usize, block_size: u64) -> Self {
        assert!(num_sets > 0 && num_ways > 0, "directory needs at least one block");
        let mut sets = Vec::with_capacity(num_sets);
        let mut lru = Vec::with_capacity(num_sets);
        for set_id in 0..num_sets {
            let ways = (0..num_ways)
                .map(|way_id| Block {
                    set_id,
                    way_id,
                    cache_address: (set_id * num_ways + way_id) as u64 * block_size,
                    ..Block::default()
                })
                .collect();
            sets.push(ways);
            lru.push((0..num_ways).collect());
        }
        Self {
            num_sets,
            num_ways,
            block_size,
            sets,
            lru,
        }
    }

    pub fn num_sets(&self) -> usize {
        self.num_sets
    }

    pub fn num_ways(&self) -> usize {
        self.num_ways
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn line_addr(&self, addr: u64) -> u64 {
        addr - addr % self.block_size
    }

    fn set_id(&self, addr: u64) -> usize {
        ((addr / self.block_size) % self.num_sets as u64) as usize
    }

    /// Finds the valid block holding the line of `addr` for `pid`.
    pub fn lookup(&self, pid: Pid, addr: u64) -> Option<BlockRef> {
        let tag = self.line_addr(addr);
        self.sets[self.set_id(addr)]
            .iter()
            .find(|b| b.valid && b.tag == tag && b.pid == pid)
            .map(Block::block_ref)
    }

    /// An invalid way of the set if there is one, otherwise the least recently used.
    pub fn find_victim(&self, addr: u64) -> BlockRef {
        let set_id = self.set_id(addr);
        let set = &self.sets[set_id];
        let way_id = set
            .iter()
            .position(|b| !b.valid)
            .or_else(|| self.lru[set_id].last().copied())
            .unwrap_or(0);
        BlockRef { set_id, way_id }
    }

    /// Marks the block as most recently used.
    pub fn visit(&mut self, block: BlockRef) {
        let order = &mut self.lru[block.set_id];
        if let Some(pos) = order.iter().position(|&way| way == block.way_id) {
            order.remove(pos);
        }
        order.insert(0, block.way_id);
    }

    pub fn block(&self, block: BlockRef) -> &Block {
        &self.sets[block.set_id][block.way_id]
    }

    pub fn block_mut(&mut self, block: BlockRef) -> &mut Block {
        &mut self.sets[block.set_id][block.way_id]
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.sets.iter().flatten()
    }

    /// Invalidates every block and forgets the LRU history.
    pub fn reset(&mut self) {
        for (set, order) in self.sets.iter_mut().zip(self.lru.iter_mut()) {
            for block in set.iter_mut() {
                block.pid = 0;
                block.tag = 0;
                block.valid = false;
                block.locked = false;
                block.read_count = 0;
            }
            order.clear();
            order.extend(0..self.num_ways);
        }
    }
}
