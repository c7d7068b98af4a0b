//! Reference remote store.
//!
//! Production deployments plug a hosted document database in through
//! [`crate::DocumentStore`]; this in-process implementation backs the
//! loopback node and the tests.

pub mod memory;

pub use memory::MemoryStore;
