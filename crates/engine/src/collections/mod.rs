pub mod chain_map;
pub mod fifo;

pub use chain_map::ChainMap;
pub use fifo::Fifo;
