//! Per-datacenter session bundle and init state
//!
//! A record moves from invalid to initializing when a caller wins the CAS on
//! `valid`, and to inited when the winner stores the sessions. It never goes
//! back. Callers that lose the CAS block on the record's condvar until the
//! sessions appear or the dispatcher stops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};
use crate::net::session::SessionGroup;
use crate::types::QueryClass;

/// The four session groups of one datacenter
pub struct DcSessions {
    /// Regular API calls
    pub common: Arc<dyn SessionGroup>,
    /// File part uploads
    pub upload: Arc<dyn SessionGroup>,
    /// Large downloads
    pub download: Arc<dyn SessionGroup>,
    /// Small downloads
    pub download_small: Arc<dyn SessionGroup>,
}

impl DcSessions {
    /// Group serving `class`
    pub fn for_class(&self, class: QueryClass) -> &Arc<dyn SessionGroup> {
        match class {
            QueryClass::Common => &self.common,
            QueryClass::Upload => &self.upload,
            QueryClass::Download => &self.download,
            QueryClass::DownloadSmall => &self.download_small,
        }
    }

    /// All four groups
    pub fn all(&self) -> [&Arc<dyn SessionGroup>; 4] {
        [&self.common, &self.upload, &self.download, &self.download_small]
    }
}

#[derive(Default)]
pub(crate) struct DcRecord {
    valid: AtomicBool,
    sessions: OnceCell<DcSessions>,
    wait_lock: Mutex<()>,
    wait_cv: Condvar,
}

impl DcRecord {
    /// Whether initialization has started
    pub(crate) fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Claim the right to initialize. True for exactly one caller.
    pub(crate) fn try_claim(&self) -> bool {
        self.valid
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Sessions, once inited
    pub(crate) fn sessions(&self) -> Option<&DcSessions> {
        self.sessions.get()
    }

    /// Store the sessions and wake every waiter
    pub(crate) fn publish(&self, sessions: DcSessions) -> &DcSessions {
        let sessions = match self.sessions.try_insert(sessions) {
            Ok(stored) => stored,
            Err((stored, _)) => stored,
        };
        self.wake_all();
        sessions
    }

    /// Block until the sessions exist or `stopped` reports true
    pub(crate) fn wait_inited(&self, stopped: impl Fn() -> bool) -> Option<&DcSessions> {
        let mut guard = self.wait_lock.lock();
        loop {
            if let Some(sessions) = self.sessions.get() {
                return Some(sessions);
            }
            if stopped() {
                return None;
            }
            self.wait_cv.wait(&mut guard);
        }
    }

    /// Wake every waiter so it re-checks its exit conditions
    pub(crate) fn wake_all(&self) {
        let _guard = self.wait_lock.lock();
        self.wait_cv.notify_all();
    }
}
