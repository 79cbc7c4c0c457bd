//! Runtime-updatable network options
//!
//! The dispatcher reads these whenever it builds or reconfigures session
//! groups. Readers never block; an update swaps in a new snapshot.

use std::sync::Arc;
use arc_swap::ArcSwap;
use crate::core::config::NetworkConfig;

/// Source of the options that shape session groups
pub trait NetOptions: Send + Sync {
    /// Desired concurrent sessions per datacenter, at least 1
    fn session_count(&self) -> i32;

    /// Whether perfect-forward-secrecy sessions are required
    fn use_pfs(&self) -> bool;
}

/// One consistent view of the options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetOptionsSnapshot {
    /// Desired concurrent sessions per datacenter
    pub session_count: i32,
    /// Whether perfect-forward-secrecy sessions are required
    pub use_pfs: bool,
}

/// Lock-free shared options
pub struct SharedOptions {
    inner: ArcSwap<NetOptionsSnapshot>,
}

impl SharedOptions {
    /// Create options with the given values
    pub fn new(session_count: i32, use_pfs: bool) -> Self {
        Self {
            inner: ArcSwap::from_pointee(NetOptionsSnapshot { session_count, use_pfs }),
        }
    }

    /// Create options from the network section of the config
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(config.session_count, config.use_pfs)
    }

    /// Current snapshot
    pub fn snapshot(&self) -> NetOptionsSnapshot {
        **self.inner.load()
    }

    /// Change the desired session count
    pub fn set_session_count(&self, session_count: i32) {
        self.inner.rcu(|current| {
            Arc::new(NetOptionsSnapshot { session_count, ..**current })
        });
    }

    /// Change the forward-secrecy requirement
    pub fn set_use_pfs(&self, use_pfs: bool) {
        self.inner.rcu(|current| Arc::new(NetOptionsSnapshot { use_pfs, ..**current }));
    }
}

impl Default for SharedOptions {
    fn default() -> Self {
        Self::from_config(&NetworkConfig::default())
    }
}

impl NetOptions for SharedOptions {
    fn session_count(&self) -> i32 {
        self.inner.load().session_count.max(1)
    }

    fn use_pfs(&self) -> bool {
        self.inner.load().use_pfs
    }
}
