use std::fmt;

use crate::base::port::PortId;

/// Decides which lower-level module serves a given address.
pub trait LowModuleFinder: fmt::Debug {
    fn find(&self, address: u64) -> PortId;
}

/// Every address goes to the same module.
#[derive(Debug, Clone, Copy)]
pub struct SingleLowModuleFinder {
    pub low_module: PortId,
}

impl SingleLowModuleFinder {
    pub fn new(low_module: PortId) -> Self {
        Self { low_module }
    }
}

impl LowModuleFinder for SingleLowModuleFinder {
    fn find(&self, _address: u64) -> PortId {
        self.low_module
    }
}

/// Addresses are interleaved over several modules in `interleaving_size` chunks.
#[derive(Debug, Clone)]
pub struct InterleavedLowModuleFinder {
    pub interleaving_size: u64,
    pub low_modules: Vec<PortId>,
}

impl InterleavedLowModuleFinder {
    pub fn new(interleaving_size: u64, low_modules: Vec<PortId>) -> Self {
        assert!(interleaving_size > 0, "interleaving_size must be > 0");
        assert!(!low_modules.is_empty(), "need at least one low module");
        Self {
            interleaving_size,
            low_modules,
        }
    }
}

impl LowModuleFinder for InterleavedLowModuleFinder {
    fn find(&self, address: u64) -> PortId {
        let idx = (address / self.interleaving_size) % self.low_modules.len() as u64;
        self.low_modules[idx as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_finder_ignores_address() {
        let finder = SingleLowModuleFinder::new(PortId(3));
        assert_eq!(finder.find(0), PortId(3));
        assert_eq!(finder.find(0xdead_beef), PortId(3));
    }

    #[test]
    fn interleaved_finder_round_robins_chunks() {
        let finder = InterleavedLowModuleFinder::new(64, vec![PortId(1), PortId(2)]);
        assert_eq!(finder.find(0), PortId(1));
        assert_eq!(finder.find(63), PortId(1));
        assert_eq!(finder.find(64), PortId(2));
        assert_eq!(finder.find(128), PortId(1));
    }
}
