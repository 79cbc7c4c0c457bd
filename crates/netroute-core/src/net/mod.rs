//! Query dispatch and datacenter management
//!
//! [`NetQueryDispatcher`] routes every outgoing query to the session group
//! serving its class in its destination datacenter. Datacenters are brought
//! up lazily on first use. Migrate redirects move the logical main
//! datacenter; transient failures go to a [`QueryDelayer`] and come back
//! through [`NetQueryDispatcher::dispatch`] once their backoff expires.

/// Collaborator traits the dispatcher drives
pub mod session;

/// Per-datacenter session bundle and init state
pub mod dc_record;

/// Migrate error parsing
pub mod migrate;

/// The dispatcher facade
pub mod dispatcher;

/// Backoff retry of transient failures
pub mod delayer;

#[cfg(test)]
mod tests;

pub use session::{
    AuthData, DcAuthManager, QueryDelayer, SessionGroup, SessionGroupFactory, SessionGroupOptions,
};
pub use dc_record::DcSessions;
pub use dispatcher::{DispatcherDeps, NetQueryDispatcher};
pub use delayer::NetQueryDelayer;
