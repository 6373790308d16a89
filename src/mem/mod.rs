pub mod ideal;
pub mod low_module;
pub mod storage;

pub use ideal::{IdealMemConfig, IdealMemController};
pub use low_module::{InterleavedLowModuleFinder, LowModuleFinder, SingleLowModuleFinder};
pub use storage::Storage;
