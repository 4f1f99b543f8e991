//! Token store implementations

pub mod memory;

pub use memory::MemoryTokenStore;
