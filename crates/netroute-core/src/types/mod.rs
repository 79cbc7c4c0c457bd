//! Type definitions shared by the dispatcher and the resource manager

/// Error types
pub mod error;

/// Datacenter identifiers
pub mod dc_id;

/// Queries and their completion state
pub mod query;

/// Per-worker resource ledger
pub mod resource_state;

pub use error::{Error, Result, DispatchError};
pub use dc_id::DcId;
pub use query::{NetQuery, QueryClass, QueryError, QueryState, QueryCallback};
pub use resource_state::ResourceState;
