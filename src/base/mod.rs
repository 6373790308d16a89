pub mod engine;
pub mod msg;
pub mod port;
