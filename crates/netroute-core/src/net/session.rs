//! Collaborator traits the dispatcher drives
//!
//! The transport, the auth-key lifecycle and the retry delayer live outside
//! this crate. The dispatcher only needs to hand them queries and tell them
//! about configuration changes, so each is a small trait object. Production
//! implementations usually forward into a channel owned by an actor task.

use std::sync::Arc;
use crate::types::{DcId, NetQuery, QueryClass};

/// Auth material shared by every session group of one datacenter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthData {
    /// Datacenter the auth key belongs to
    pub dc_id: DcId,
    /// Whether this is a content-delivery datacenter
    pub is_cdn: bool,
}

impl AuthData {
    /// Auth data for `dc_id`; external ids are content-delivery endpoints
    pub fn new(dc_id: DcId) -> Self {
        Self { dc_id, is_cdn: dc_id.is_external() }
    }
}

/// Everything a transport needs to open one session group
#[derive(Debug, Clone)]
pub struct SessionGroupOptions {
    /// Name used in logs, `SessionGroup:<dc>:<class>`
    pub name: String,
    /// Datacenter served
    pub dc_id: DcId,
    /// Query class served
    pub class: QueryClass,
    /// Concurrent sessions to keep open
    pub session_count: i32,
    /// Shared auth material of the datacenter
    pub auth: Arc<AuthData>,
    /// Whether this group talks to the main datacenter
    pub is_main: bool,
    /// Require perfect-forward-secrecy sessions
    pub use_pfs: bool,
    /// Sessions may be restricted to media traffic
    pub allow_media_only: bool,
    /// Sessions carry file traffic
    pub is_media: bool,
    /// Datacenter is a content-delivery endpoint
    pub is_cdn: bool,
}

/// A set of transport sessions serving one query class of one datacenter
pub trait SessionGroup: Send + Sync {
    /// Send a query over one of the sessions. The transport eventually
    /// finishes the query and dispatches it again.
    fn send(&self, query: NetQuery);

    /// Change the number of sessions and the forward-secrecy requirement
    fn update_options(&self, session_count: i32, use_pfs: bool);

    /// Change the forward-secrecy requirement
    fn update_use_pfs(&self, use_pfs: bool);

    /// Mark whether this group serves the main datacenter
    fn update_main_flag(&self, is_main: bool);

    /// Close every session
    fn hangup(&self);
}

/// Builds session groups when a datacenter is brought up
pub trait SessionGroupFactory: Send + Sync {
    /// Open a session group with the given options
    fn create(&self, options: SessionGroupOptions) -> Arc<dyn SessionGroup>;
}

/// Owner of per-datacenter auth keys
pub trait DcAuthManager: Send + Sync {
    /// Start managing the auth key of a newly initialized datacenter
    fn add_dc(&self, auth: Arc<AuthData>);

    /// The main datacenter moved
    fn update_main_dc(&self, dc_id: DcId);

    /// Stop managing keys
    fn hangup(&self) {}
}

/// Holds transiently failed queries until they may be retried
pub trait QueryDelayer: Send + Sync {
    /// Take a query whose error is retry-eligible
    fn delay(&self, query: NetQuery);

    /// Drop every held query and stop
    fn hangup(&self);
}
