//! Persisted key-value state
//!
//! The dispatcher persists the main datacenter id through [`KeyValueStore`].
//! Two implementations ship here: an in-memory map for tests and ephemeral
//! clients, and a JSON file written through on every change.

use crate::types::Result;

/// In-memory store
pub mod memory;

/// JSON file store
pub mod file;

pub use memory::MemoryKeyValueStore;
pub use file::FileKeyValueStore;

/// Minimal string key-value store
pub trait KeyValueStore: Send + Sync {
    /// Value stored under `key`
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`
    fn set(&self, key: &str, value: String) -> Result<()>;
}
