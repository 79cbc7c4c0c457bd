//! # Netroute Core
//!
//! Query routing and resource arbitration for a client talking to a sharded,
//! multi-datacenter RPC backend.
//!
//! Two subsystems live here:
//! - [`net`]: the query dispatcher. It lazily brings up per-datacenter session
//!   groups, routes queries by datacenter and class, follows migrate redirects
//!   and hands transient failures to a backoff delayer.
//! - [`resources`]: the resource manager. It arbitrates a shared transfer
//!   budget among file-transfer workers, serving the worker with the largest
//!   unmet demand first.

#![warn(missing_docs)]

/// Core configuration, runtime options and logging
pub mod core;

/// System constants
pub mod constants;

/// Type definitions shared by both subsystems
pub mod types;

/// Query dispatch and datacenter management
pub mod net;

/// Shared resource budget scheduling
pub mod resources;

/// Persisted key-value state
pub mod storage;

/// Metrics
pub mod system;

// Re-export commonly used items
pub use types::{DcId, NetQuery, QueryClass, QueryError, QueryCallback, ResourceState};
pub use types::{Error, Result, DispatchError};
pub use net::{NetQueryDispatcher, DispatcherDeps};
pub use resources::{ResourceManager, ResourceMode, WorkerLink};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
