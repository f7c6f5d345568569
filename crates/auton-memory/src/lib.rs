//! Durable key-ordered storage for memory entries, tasks, and cost records.

mod entry;
mod store;

pub use entry::{CostRecord, MemoryEntry, MemoryKind, ModelUsage};
pub use store::MemoryStore;
