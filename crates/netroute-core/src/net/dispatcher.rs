//! The dispatcher facade
//!
//! `dispatch` is called from any thread: by callers submitting new queries,
//! by session groups handing back finished ones and by the delayer once a
//! backoff expires. The only shared mutable state is the main datacenter id
//! and the per-datacenter init flags. Everything else is owned by the
//! collaborators.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Weak};
use parking_lot::Mutex;

use crate::constants::{
    DEFAULT_MAIN_DC_ID, FLOOD_WAIT_CODE, INTERNAL_ERROR_CODE, MAIN_DC_ID_KEY, MAX_DC_COUNT,
    MIGRATE_CODE, REDUCED_UPLOAD_DCS, REDUCED_UPLOAD_SESSION_COUNT, RESEND_CODE,
    UPLOAD_SESSION_COUNT,
};
use crate::core::options::NetOptions;
use crate::net::dc_record::{DcRecord, DcSessions};
use crate::net::migrate::parse_migrate;
use crate::net::session::{
    AuthData, DcAuthManager, QueryDelayer, SessionGroupFactory, SessionGroupOptions,
};
use crate::storage::KeyValueStore;
use crate::system::metrics::Metrics;
use crate::types::{DcId, DispatchError, NetQuery, QueryCallback, QueryClass, QueryError};
use crate::{log_debug, log_error, log_info, log_trace, log_warn};

/// Collaborators injected into the dispatcher
pub struct DispatcherDeps {
    /// Opens session groups when a datacenter is brought up
    pub session_factory: Arc<dyn SessionGroupFactory>,
    /// Told about new datacenters and main datacenter changes
    pub auth_manager: Arc<dyn DcAuthManager>,
    /// Persists the main datacenter id
    pub store: Arc<dyn KeyValueStore>,
    /// Session count and forward-secrecy settings
    pub options: Arc<dyn NetOptions>,
    /// Receives finished queries that carry no callback
    pub default_sink: QueryCallback,
}

/// Routes queries to per-datacenter session groups
pub struct NetQueryDispatcher {
    dcs: Box<[DcRecord]>,
    main_dc_id: AtomicI32,
    /// Serializes main datacenter changes, datacenter init and shutdown
    main_dc_lock: Mutex<()>,
    stop_flag: AtomicBool,
    delayer: Arc<dyn QueryDelayer>,
    session_factory: Arc<dyn SessionGroupFactory>,
    auth_manager: Arc<dyn DcAuthManager>,
    store: Arc<dyn KeyValueStore>,
    options: Arc<dyn NetOptions>,
    default_sink: QueryCallback,
}

impl NetQueryDispatcher {
    /// Create a dispatcher. `make_delayer` receives a weak handle to the
    /// dispatcher so the delayer can dispatch retried queries again.
    pub fn new<F>(deps: DispatcherDeps, make_delayer: F) -> Arc<Self>
    where
        F: FnOnce(Weak<NetQueryDispatcher>) -> Arc<dyn QueryDelayer>,
    {
        let main_dc_id = read_main_dc_id(deps.store.as_ref());
        log_info!("NetQueryDispatcher created with main_dc_id {}", main_dc_id);

        Arc::new_cyclic(|weak| Self {
            dcs: (0..MAX_DC_COUNT).map(|_| DcRecord::default()).collect(),
            main_dc_id: AtomicI32::new(main_dc_id),
            main_dc_lock: Mutex::new(()),
            stop_flag: AtomicBool::new(false),
            delayer: make_delayer(weak.clone()),
            session_factory: deps.session_factory,
            auth_manager: deps.auth_manager,
            store: deps.store,
            options: deps.options,
            default_sink: deps.default_sink,
        })
    }

    /// Route a query: finish it, hand it to the delayer or forward it to a
    /// session group.
    pub fn dispatch(&self, mut query: NetQuery) {
        let metrics = &Metrics::global().dispatch;
        if self.is_stopping() {
            // Nobody is listening any more; the error only marks the query.
            query.set_error(QueryError::closing());
            query.clear();
            metrics.queries_dropped.inc();
            log_trace!("Dropped {} after stop", query);
            return;
        }

        if let Some(code) = query.error().map(|error| error.code) {
            if code == MIGRATE_CODE {
                self.try_fix_migrate(&mut query);
            } else if code == RESEND_CODE {
                query.resend();
            } else if code < 0 || code == INTERNAL_ERROR_CODE || code == FLOOD_WAIT_CODE {
                log_trace!("{} sent to delayer", query);
                metrics.queries_delayed.inc();
                self.delayer.delay(query);
                return;
            }
        }

        if !query.is_ready() && query.dispatch_ttl() == 0 {
            metrics.ttl_exhausted.inc();
            query.set_error(QueryError::dispatch_ttl());
        }

        let mut dest_dc_id = query.dc_id();
        if dest_dc_id.is_main() {
            dest_dc_id = DcId::internal(self.main_dc_id());
        }

        if query.is_ready() {
            self.deliver(query);
            return;
        }

        let sessions = match self.wait_dc_init(dest_dc_id, true) {
            Ok(sessions) => sessions,
            Err(e) => {
                log_debug!("Cannot route {}: {}", query, e);
                query.set_error(QueryError::no_such_dc(dest_dc_id));
                self.deliver(query);
                return;
            }
        };

        query.consume_dispatch_ttl();
        log_trace!("{} sent to {} session group of {}", query, query.class().as_str(), dest_dc_id);
        metrics.queries_forwarded.inc();
        sessions.for_class(query.class()).send(query);
    }

    /// Attach `callback` and dispatch
    pub fn dispatch_with_callback(&self, mut query: NetQuery, callback: QueryCallback) {
        query.set_callback(callback);
        self.dispatch(query);
    }

    /// Hand a finished query to its callback, or to the default sink if it
    /// has none. A disconnected receiver drops the query.
    pub fn deliver(&self, mut query: NetQuery) {
        Metrics::global().dispatch.queries_delivered.inc();
        let delivered = match query.take_callback() {
            Some(callback) => callback.deliver(query),
            None => self.default_sink.deliver(query),
        };
        if !delivered {
            log_debug!("Result receiver is gone, dropping result");
        }
    }

    /// Make sure `dc_id` has sessions. Without `force`, only succeeds for a
    /// datacenter whose initialization already started.
    pub fn ensure_dc_initialized(&self, dc_id: DcId, force: bool) -> Result<(), DispatchError> {
        self.wait_dc_init(dc_id, force).map(|_| ())
    }

    /// Bring up `dc_id` without dispatching anything
    pub fn update_valid_dc(&self, dc_id: DcId) -> Result<(), DispatchError> {
        self.ensure_dc_initialized(dc_id, true).map_err(|e| {
            log_debug!("update_valid_dc {} failed: {}", dc_id, e);
            e
        })
    }

    /// Stop routing, close every session group and the delayer, and release
    /// callers blocked on a datacenter init.
    pub fn stop(&self) {
        let _guard = self.main_dc_lock.lock();
        self.stop_flag.store(true, Ordering::Release);
        self.delayer.hangup();
        for record in self.dcs.iter().filter(|record| record.is_valid()) {
            if let Some(sessions) = record.sessions() {
                for group in sessions.all() {
                    group.hangup();
                }
            }
            record.wake_all();
        }
        self.auth_manager.hangup();
        log_info!("NetQueryDispatcher stopped");
    }

    /// Push the current session count to every main session group
    pub fn update_session_count(&self) {
        let _guard = self.main_dc_lock.lock();
        let session_count = self.options.session_count();
        let use_pfs = self.options.use_pfs();
        log_debug!("Session count is now {}", session_count);
        for sessions in self.inited_sessions() {
            sessions.common.update_options(session_count, use_pfs || session_count > 1);
        }
    }

    /// Push the current forward-secrecy setting to every session group
    pub fn update_use_pfs(&self) {
        let _guard = self.main_dc_lock.lock();
        let session_count = self.options.session_count();
        let use_pfs = self.options.use_pfs();
        log_debug!("use_pfs is now {}", use_pfs);
        for sessions in self.inited_sessions() {
            sessions.common.update_use_pfs(use_pfs || session_count > 1);
            sessions.upload.update_use_pfs(use_pfs);
            sessions.download.update_use_pfs(use_pfs);
            sessions.download_small.update_use_pfs(use_pfs);
        }
    }

    /// Current main datacenter
    pub fn main_dc_id(&self) -> i32 {
        self.main_dc_id.load(Ordering::Acquire)
    }

    /// Whether initialization of `raw_dc_id` has started
    pub fn is_dc_inited(&self, raw_dc_id: i32) -> bool {
        DcId::is_valid(raw_dc_id) && self.record(raw_dc_id).is_valid()
    }

    /// Whether `stop` has been called
    pub fn is_stopping(&self) -> bool {
        self.stop_flag.load(Ordering::Acquire)
    }

    fn record(&self, raw_dc_id: i32) -> &DcRecord {
        &self.dcs[(raw_dc_id - 1) as usize]
    }

    fn inited_sessions(&self) -> impl Iterator<Item = &DcSessions> + '_ {
        self.dcs.iter().filter_map(|record| record.sessions())
    }

    fn wait_dc_init(&self, dc_id: DcId, force: bool) -> Result<&DcSessions, DispatchError> {
        let Some(raw_dc_id) = dc_id.raw_id() else {
            return Err(DispatchError::NotExactDc(dc_id));
        };
        if !DcId::is_valid(raw_dc_id) {
            return Err(DispatchError::DcIdOutOfRange(dc_id));
        }
        let record = self.record(raw_dc_id);
        if let Some(sessions) = record.sessions() {
            return Ok(sessions);
        }

        let mut should_init = false;
        if !record.is_valid() {
            if !force {
                return Err(DispatchError::InvalidDc(dc_id));
            }
            should_init = record.try_claim();
        }

        if should_init {
            self.init_dc(dc_id, raw_dc_id, record)
        } else {
            record
                .wait_inited(|| self.is_stopping())
                .ok_or(DispatchError::Closing)
        }
    }

    fn init_dc<'a>(
        &self,
        dc_id: DcId,
        raw_dc_id: i32,
        record: &'a DcRecord,
    ) -> Result<&'a DcSessions, DispatchError> {
        let _guard = self.main_dc_lock.lock();
        if self.is_stopping() {
            record.wake_all();
            return Err(DispatchError::Closing);
        }

        let auth = Arc::new(AuthData::new(dc_id));
        let is_cdn = auth.is_cdn;
        let session_count = self.options.session_count();
        let use_pfs = self.options.use_pfs();
        let is_main = raw_dc_id == self.main_dc_id.load(Ordering::Acquire);
        let upload_count = if REDUCED_UPLOAD_DCS.contains(&raw_dc_id) {
            REDUCED_UPLOAD_SESSION_COUNT
        } else {
            UPLOAD_SESSION_COUNT
        };

        let open = |class: QueryClass, count: i32, is_main: bool, use_pfs: bool, is_media: bool| {
            self.session_factory.create(SessionGroupOptions {
                name: format!("SessionGroup:{}:{}", raw_dc_id, class.as_str()),
                dc_id,
                class,
                session_count: count,
                auth: Arc::clone(&auth),
                is_main,
                use_pfs,
                allow_media_only: is_media && class != QueryClass::Upload,
                is_media,
                is_cdn,
            })
        };
        let sessions = DcSessions {
            common: open(QueryClass::Common, session_count, is_main, use_pfs || session_count > 1, false),
            upload: open(QueryClass::Upload, upload_count, false, use_pfs || session_count > 1, true),
            download: open(QueryClass::Download, 1, false, use_pfs, true),
            download_small: open(QueryClass::DownloadSmall, 1, false, use_pfs, true),
        };
        let sessions = record.publish(sessions);

        if dc_id.is_internal() {
            self.auth_manager.add_dc(auth);
        }
        Metrics::global().dispatch.dc_initializations.inc();
        log_info!("Initialized {} (main: {}, cdn: {})", dc_id, is_main, is_cdn);
        Ok(sessions)
    }

    fn try_fix_migrate(&self, query: &mut NetQuery) {
        let Some(message) = query.error().map(|error| error.message.clone()) else {
            return;
        };
        let Some(target) = parse_migrate(&message) else {
            return;
        };
        let new_main_dc_id = target.raw_dc_id;
        if !DcId::is_valid(new_main_dc_id) {
            log_error!("Receive {} to wrong dc {}", target.prefix, new_main_dc_id);
            panic!("{} names invalid datacenter {}", target.prefix, new_main_dc_id);
        }

        if new_main_dc_id != self.main_dc_id() {
            let _guard = self.main_dc_lock.lock();
            let old_main_dc_id = self.main_dc_id.load(Ordering::Acquire);
            if new_main_dc_id != old_main_dc_id {
                log_info!("Main dc {} -> {}", old_main_dc_id, new_main_dc_id);
                if let Some(sessions) = self.record(old_main_dc_id).sessions() {
                    sessions.common.update_main_flag(false);
                }
                self.main_dc_id.store(new_main_dc_id, Ordering::Release);
                if let Some(sessions) = self.record(new_main_dc_id).sessions() {
                    sessions.common.update_main_flag(true);
                }
                self.auth_manager.update_main_dc(DcId::internal(new_main_dc_id));
                if let Err(e) = self.store.set(MAIN_DC_ID_KEY, new_main_dc_id.to_string()) {
                    log_error!("Failed to persist main_dc_id {}: {}", new_main_dc_id, e);
                }
                Metrics::global().dispatch.main_dc_migrations.inc();
            }
        }

        if query.dc_id().is_main() {
            query.resend();
        } else {
            log_warn!("{} from query to non-main {}", message, query.dc_id());
            query.resend_to(DcId::internal(new_main_dc_id));
        }
    }
}

fn read_main_dc_id(store: &dyn KeyValueStore) -> i32 {
    let Some(value) = store.get(MAIN_DC_ID_KEY) else {
        return DEFAULT_MAIN_DC_ID;
    };
    match value.trim().parse::<i32>() {
        Ok(id) if DcId::is_valid(id) => id,
        _ => {
            log_warn!("Ignoring stored main_dc_id {:?}", value);
            DEFAULT_MAIN_DC_ID
        }
    }
}
