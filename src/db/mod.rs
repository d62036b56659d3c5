//! Persistence layer: a keyed store with upsert semantics.

pub mod memory;

pub use memory::Store;
