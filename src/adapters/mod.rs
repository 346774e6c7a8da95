// Adapters layer: concrete implementations of the persistence and storage ports.

pub mod memory;
pub mod storage;

pub use memory::{MemoryDatabase, MemoryTransaction};
pub use storage::LocalStorage;
