//! Shared resource budget scheduling
//!
//! File-transfer workers register with a [`ResourceManager`] and report how
//! much more budget they could use. The manager serves the worker with the
//! largest unmet demand first (priority breaks ties) until the shared budget
//! runs out, and re-evaluates whenever a worker reports, changes priority or
//! goes away.
//!
//! [`ResourceScheduler`] holds the synchronous scheduling state;
//! [`ResourceManager`] runs it as a tokio actor.

use serde::{Deserialize, Serialize};

/// Slot arena with generation-checked handles
pub mod arena;

/// Indexed max-heap with removal by handle
pub mod heap;

/// Synchronous scheduling state
pub mod scheduler;

/// Actor wrapper and worker handles
pub mod manager;


pub use arena::NodeId;
pub use heap::{HeapKey, KeyedHeap};
pub use scheduler::{ResourceGrant, ResourceScheduler};
pub use manager::{ResourceManager, WorkerLink};

/// How budget beyond declared demand is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceMode {
    /// Never grant more than a worker's declared extra demand
    Baseline,
    /// Idle budget left after all demand is met goes to the top worker
    #[default]
    Greedy,
}
