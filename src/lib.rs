pub mod base;
pub mod cache;
pub mod mem;
pub mod rob;
pub mod sim;
pub mod timeq;
pub mod traffic;
