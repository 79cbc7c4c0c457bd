use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::*;
use crate::constants::{DEFAULT_DISPATCH_TTL, LOCAL_ERROR_CODE, MAIN_DC_ID_KEY};
use crate::core::config::DelayerConfig;
use crate::core::options::SharedOptions;
use crate::net::delayer::{compute_backoff, Backoff};
use crate::storage::{KeyValueStore, MemoryKeyValueStore};
use crate::types::{DcId, DispatchError, NetQuery, QueryCallback, QueryClass, QueryError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum GroupEvent {
    UpdateOptions(String, i32, bool),
    UpdateUsePfs(String, bool),
    MainFlag(String, bool),
    Hangup(String),
}

type SentLog = Arc<Mutex<Vec<(String, NetQuery)>>>;
type EventLog = Arc<Mutex<Vec<GroupEvent>>>;
type CreateGate = (std_mpsc::Sender<()>, std_mpsc::Receiver<()>);

struct MockGroup {
    name: String,
    sent: SentLog,
    events: EventLog,
}

impl SessionGroup for MockGroup {
    fn send(&self, query: NetQuery) {
        self.sent.lock().push((self.name.clone(), query));
    }

    fn update_options(&self, session_count: i32, use_pfs: bool) {
        self.events
            .lock()
            .push(GroupEvent::UpdateOptions(self.name.clone(), session_count, use_pfs));
    }

    fn update_use_pfs(&self, use_pfs: bool) {
        self.events.lock().push(GroupEvent::UpdateUsePfs(self.name.clone(), use_pfs));
    }

    fn update_main_flag(&self, is_main: bool) {
        self.events.lock().push(GroupEvent::MainFlag(self.name.clone(), is_main));
    }

    fn hangup(&self) {
        self.events.lock().push(GroupEvent::Hangup(self.name.clone()));
    }
}

#[derive(Default)]
struct MockFactory {
    created: Mutex<Vec<SessionGroupOptions>>,
    sent: SentLog,
    events: EventLog,
    create_delay: Option<Duration>,
    /// Signals on the first `create`, then blocks it until released
    hold_first_create: Mutex<Option<CreateGate>>,
}

impl SessionGroupFactory for MockFactory {
    fn create(&self, options: SessionGroupOptions) -> Arc<dyn SessionGroup> {
        if let Some(delay) = self.create_delay {
            std::thread::sleep(delay);
        }
        let gate = self.hold_first_create.lock().take();
        if let Some((entered, release)) = gate {
            entered.send(()).unwrap();
            release.recv().unwrap();
        }
        let group = MockGroup {
            name: options.name.clone(),
            sent: Arc::clone(&self.sent),
            events: Arc::clone(&self.events),
        };
        self.created.lock().push(options);
        Arc::new(group)
    }
}

#[derive(Default)]
struct MockAuth {
    added: Mutex<Vec<DcId>>,
    main_updates: Mutex<Vec<DcId>>,
    hangups: AtomicUsize,
}

impl DcAuthManager for MockAuth {
    fn add_dc(&self, auth: Arc<AuthData>) {
        self.added.lock().push(auth.dc_id);
    }

    fn update_main_dc(&self, dc_id: DcId) {
        self.main_updates.lock().push(dc_id);
    }

    fn hangup(&self) {
        self.hangups.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MockDelayer {
    delayed: Mutex<Vec<NetQuery>>,
    hangups: AtomicUsize,
}

impl QueryDelayer for MockDelayer {
    fn delay(&self, query: NetQuery) {
        self.delayed.lock().push(query);
    }

    fn hangup(&self) {
        self.hangups.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    dispatcher: Arc<NetQueryDispatcher>,
    factory: Arc<MockFactory>,
    auth: Arc<MockAuth>,
    delayer: Arc<MockDelayer>,
    store: Arc<MemoryKeyValueStore>,
    options: Arc<SharedOptions>,
    sink: mpsc::UnboundedReceiver<NetQuery>,
}

impl Harness {
    fn new() -> Self {
        Self::build(MemoryKeyValueStore::new(), MockFactory::default())
    }

    fn build(store: MemoryKeyValueStore, factory: MockFactory) -> Self {
        let factory = Arc::new(factory);
        let auth = Arc::new(MockAuth::default());
        let delayer = Arc::new(MockDelayer::default());
        let store = Arc::new(store);
        let options = Arc::new(SharedOptions::new(1, false));
        let (default_sink, sink) = QueryCallback::channel();

        let deps = DispatcherDeps {
            session_factory: factory.clone(),
            auth_manager: auth.clone(),
            store: store.clone(),
            options: options.clone(),
            default_sink,
        };
        let mock_delayer = Arc::clone(&delayer);
        let dispatcher = NetQueryDispatcher::new(deps, move |_| mock_delayer as Arc<dyn QueryDelayer>);

        Self { dispatcher, factory, auth, delayer, store, options, sink }
    }

    fn take_sent(&self) -> Vec<(String, NetQuery)> {
        std::mem::take(&mut *self.factory.sent.lock())
    }

    fn events(&self) -> Vec<GroupEvent> {
        self.factory.events.lock().clone()
    }

    fn created_for(&self, raw_dc_id: i32) -> Vec<SessionGroupOptions> {
        self.factory
            .created
            .lock()
            .iter()
            .filter(|options| options.dc_id.raw_id() == Some(raw_dc_id))
            .cloned()
            .collect()
    }
}

fn query(dc_id: DcId) -> NetQuery {
    NetQuery::new(dc_id, QueryClass::Common, Bytes::from_static(b"ping"))
}

fn failed(dc_id: DcId, code: i32, message: &str) -> NetQuery {
    let mut query = query(dc_id);
    query.set_error(QueryError::new(code, message));
    query
}

#[test]
fn main_query_goes_to_common_group_of_main_dc() {
    let h = Harness::new();
    h.dispatcher.dispatch(query(DcId::main()));

    let sent = h.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "SessionGroup:2:main");
    assert_eq!(sent[0].1.dispatch_ttl(), DEFAULT_DISPATCH_TTL - 1);
    assert!(h.dispatcher.is_dc_inited(2));
    assert!(!h.dispatcher.is_dc_inited(3));
}

#[test]
fn queries_route_by_class() {
    let h = Harness::new();
    for class in [QueryClass::Upload, QueryClass::Download, QueryClass::DownloadSmall] {
        h.dispatcher
            .dispatch(NetQuery::new(DcId::internal(3), class, Bytes::new()));
    }
    let names: Vec<String> = h.take_sent().into_iter().map(|(name, _)| name).collect();
    assert_eq!(
        names,
        vec!["SessionGroup:3:upload", "SessionGroup:3:download", "SessionGroup:3:download_small"]
    );
}

#[test]
fn session_groups_get_class_specific_options() {
    let h = Harness::new();
    h.options.set_session_count(3);
    h.dispatcher.update_valid_dc(DcId::internal(2)).unwrap();
    h.dispatcher.update_valid_dc(DcId::internal(5)).unwrap();
    h.dispatcher.update_valid_dc(DcId::external(7)).unwrap();

    let dc2 = h.created_for(2);
    assert_eq!(dc2.len(), 4);
    let common = &dc2[0];
    assert_eq!(common.class, QueryClass::Common);
    assert_eq!(common.session_count, 3);
    assert!(common.is_main);
    assert!(common.use_pfs);
    assert!(!common.is_media);
    let upload = &dc2[1];
    assert_eq!(upload.session_count, 4);
    assert!(upload.use_pfs && upload.is_media && !upload.allow_media_only);
    let download = &dc2[2];
    assert_eq!(download.session_count, 1);
    assert!(!download.use_pfs && download.allow_media_only);
    assert!(Arc::ptr_eq(&common.auth, &download.auth));

    let dc5 = h.created_for(5);
    assert!(!dc5[0].is_main);
    assert_eq!(dc5[1].session_count, 8);

    let dc7 = h.created_for(7);
    assert!(dc7.iter().all(|options| options.is_cdn));

    assert_eq!(*h.auth.added.lock(), vec![DcId::internal(2), DcId::internal(5)]);
}

#[test]
fn ttl_bounds_number_of_forwards() {
    let h = Harness::new();
    let (callback, mut results) = QueryCallback::channel();
    h.dispatcher
        .dispatch_with_callback(query(DcId::internal(2)).with_dispatch_ttl(3), callback);

    let mut forwards = 0;
    loop {
        let Some((_, mut query)) = h.take_sent().pop() else {
            break;
        };
        forwards += 1;
        query.set_error(QueryError::resend());
        h.dispatcher.dispatch(query);
    }

    assert_eq!(forwards, 3);
    let query = results.try_recv().unwrap();
    assert_eq!(query.error(), Some(&QueryError::dispatch_ttl()));
}

#[test]
fn unlimited_ttl_is_never_consumed() {
    let h = Harness::new();
    h.dispatcher.dispatch(query(DcId::internal(2)).with_dispatch_ttl(-1));
    for _ in 0..50 {
        let (_, mut query) = h.take_sent().pop().unwrap();
        assert!(query.has_unlimited_ttl());
        query.set_error(QueryError::resend());
        h.dispatcher.dispatch(query);
    }
    assert_eq!(h.take_sent().len(), 1);
}

#[test]
fn concurrent_callers_share_one_initialization() {
    let factory = MockFactory {
        create_delay: Some(Duration::from_millis(5)),
        ..MockFactory::default()
    };
    let h = Harness::build(MemoryKeyValueStore::new(), factory);

    let dispatcher = &h.dispatcher;
    let results: Vec<Result<(), DispatchError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| scope.spawn(|| dispatcher.ensure_dc_initialized(DcId::internal(4), true)))
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(h.created_for(4).len(), 4);
    assert_eq!(*h.auth.added.lock(), vec![DcId::internal(4)]);
}

#[test]
fn ensure_rejects_bad_ids() {
    let h = Harness::new();
    let d = &h.dispatcher;
    assert_eq!(
        d.ensure_dc_initialized(DcId::main(), true),
        Err(DispatchError::NotExactDc(DcId::main()))
    );
    assert_eq!(
        d.ensure_dc_initialized(DcId::internal(0), true),
        Err(DispatchError::DcIdOutOfRange(DcId::internal(0)))
    );
    assert_eq!(
        d.ensure_dc_initialized(DcId::internal(1001), true),
        Err(DispatchError::DcIdOutOfRange(DcId::internal(1001)))
    );
    assert_eq!(
        d.ensure_dc_initialized(DcId::internal(3), false),
        Err(DispatchError::InvalidDc(DcId::internal(3)))
    );
    assert_eq!(d.ensure_dc_initialized(DcId::internal(3), true), Ok(()));
    assert_eq!(d.ensure_dc_initialized(DcId::internal(3), false), Ok(()));
    assert!(h.created_for(3).len() == 4);
}

#[test]
fn unknown_dc_is_a_terminal_error() {
    let h = Harness::new();
    let (callback, mut results) = QueryCallback::channel();
    h.dispatcher.dispatch_with_callback(query(DcId::internal(1500)), callback);

    let query = results.try_recv().unwrap();
    assert_eq!(query.error(), Some(&QueryError::no_such_dc(DcId::internal(1500))));
    assert!(h.take_sent().is_empty());
}

#[test]
fn local_errors_are_delivered_again_not_retried() {
    let h = Harness::new();
    let (callback, mut results) = QueryCallback::channel();
    h.dispatcher
        .dispatch_with_callback(query(DcId::internal(2)).with_dispatch_ttl(0), callback.clone());
    h.dispatcher
        .dispatch_with_callback(query(DcId::internal(5000)), callback.clone());

    for _ in 0..2 {
        let mut finished = results.try_recv().unwrap();
        let code = finished.error().map(|e| e.code);
        assert_eq!(code, Some(LOCAL_ERROR_CODE));

        finished.set_callback(callback.clone());
        h.dispatcher.dispatch(finished);
        let again = results.try_recv().unwrap();
        assert_eq!(again.error().map(|e| e.code), code);
    }

    assert!(h.delayer.delayed.lock().is_empty());
    assert!(h.take_sent().is_empty());
}

#[test]
fn main_addressed_migrate_moves_main_and_resends_to_main() {
    let h = Harness::new();
    h.dispatcher.dispatch(failed(DcId::main(), 303, "USER_MIGRATE_7"));

    assert_eq!(h.dispatcher.main_dc_id(), 7);
    assert_eq!(h.store.get(MAIN_DC_ID_KEY).as_deref(), Some("7"));
    assert_eq!(*h.auth.main_updates.lock(), vec![DcId::internal(7)]);

    let sent = h.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "SessionGroup:7:main");
    assert!(sent[0].1.dc_id().is_main());
    assert!(!sent[0].1.is_ready());
    assert!(h.created_for(7)[0].is_main);
}

#[test]
fn explicit_migrate_resends_to_named_dc() {
    let h = Harness::new();
    h.dispatcher.dispatch(failed(DcId::internal(3), 303, "PHONE_MIGRATE_9"));

    assert_eq!(h.dispatcher.main_dc_id(), 9);
    let sent = h.take_sent();
    assert_eq!(sent[0].0, "SessionGroup:9:main");
    assert_eq!(sent[0].1.dc_id(), DcId::internal(9));
}

#[test]
fn repeated_migrate_is_idempotent() {
    let h = Harness::new();
    h.dispatcher.dispatch(failed(DcId::main(), 303, "NETWORK_MIGRATE_5"));
    h.dispatcher.dispatch(failed(DcId::main(), 303, "NETWORK_MIGRATE_5"));

    assert_eq!(h.store.write_count(), 1);
    assert_eq!(h.auth.main_updates.lock().len(), 1);
    assert_eq!(h.take_sent().len(), 2);
}

#[test]
fn migrate_moves_main_flag_between_groups() {
    let h = Harness::new();
    h.dispatcher.update_valid_dc(DcId::internal(2)).unwrap();
    h.dispatcher.update_valid_dc(DcId::internal(4)).unwrap();
    h.dispatcher.dispatch(failed(DcId::main(), 303, "USER_MIGRATE_4"));

    let flags: Vec<GroupEvent> = h
        .events()
        .into_iter()
        .filter(|event| matches!(event, GroupEvent::MainFlag(..)))
        .collect();
    assert_eq!(
        flags,
        vec![
            GroupEvent::MainFlag("SessionGroup:2:main".to_string(), false),
            GroupEvent::MainFlag("SessionGroup:4:main".to_string(), true),
        ]
    );
}

#[test]
#[should_panic(expected = "invalid datacenter")]
fn migrate_to_invalid_dc_panics() {
    let h = Harness::new();
    h.dispatcher.dispatch(failed(DcId::main(), 303, "USER_MIGRATE_abc"));
}

#[test]
fn unrecognized_redirect_passes_through() {
    let h = Harness::new();
    let (callback, mut results) = QueryCallback::channel();
    h.dispatcher
        .dispatch_with_callback(failed(DcId::main(), 303, "FILE_MIGRATE_2"), callback);

    let query = results.try_recv().unwrap();
    assert_eq!(query.error().map(|e| e.code), Some(303));
    assert_eq!(h.dispatcher.main_dc_id(), 2);
    assert_eq!(h.store.write_count(), 0);
}

#[test]
fn transient_errors_go_to_delayer() {
    let h = Harness::new();
    let (callback, mut results) = QueryCallback::channel();
    for (code, message) in [(-404, "NETWORK"), (500, "INTERNAL"), (420, "FLOOD_WAIT_3")] {
        h.dispatcher
            .dispatch_with_callback(failed(DcId::main(), code, message), callback.clone());
    }

    let delayed = h.delayer.delayed.lock();
    assert_eq!(delayed.len(), 3);
    assert!(delayed.iter().all(NetQuery::has_callback));
    assert!(h.take_sent().is_empty());
    assert!(results.try_recv().is_err());
}

#[test]
fn finished_queries_reach_callback_or_default_sink() {
    let mut h = Harness::new();
    let (callback, mut results) = QueryCallback::channel();

    let mut answered = query(DcId::main());
    answered.set_ok(Bytes::from_static(b"pong"));
    h.dispatcher.dispatch_with_callback(answered, callback);
    h.dispatcher.dispatch(failed(DcId::main(), 400, "BAD_REQUEST"));

    let answered = results.try_recv().unwrap();
    assert_eq!(answered.answer().map(|b| b.as_ref()), Some(&b"pong"[..]));
    let orphan = h.sink.try_recv().unwrap();
    assert_eq!(orphan.error(), Some(&QueryError::new(400, "BAD_REQUEST")));
    assert!(h.take_sent().is_empty());
}

#[test]
fn dropped_callback_is_a_no_op() {
    let mut h = Harness::new();
    let (callback, results) = QueryCallback::channel();
    drop(results);
    h.dispatcher
        .dispatch_with_callback(failed(DcId::main(), 400, "BAD_REQUEST"), callback);
    assert!(h.sink.try_recv().is_err());
}

#[test]
fn stop_drops_queries_and_hangs_up() {
    let h = Harness::new();
    h.dispatcher.update_valid_dc(DcId::internal(2)).unwrap();
    h.dispatcher.stop();

    let (callback, mut results) = QueryCallback::channel();
    h.dispatcher.dispatch_with_callback(query(DcId::main()), callback);
    assert!(h.take_sent().is_empty());
    assert!(results.try_recv().is_err());

    assert_eq!(h.delayer.hangups.load(Ordering::SeqCst), 1);
    assert_eq!(h.auth.hangups.load(Ordering::SeqCst), 1);
    let hangups = h
        .events()
        .into_iter()
        .filter(|event| matches!(event, GroupEvent::Hangup(_)))
        .count();
    assert_eq!(hangups, 4);
}

#[test]
fn init_after_stop_reports_closing() {
    let h = Harness::new();
    h.dispatcher.stop();
    assert_eq!(
        h.dispatcher.ensure_dc_initialized(DcId::internal(6), true),
        Err(DispatchError::Closing)
    );
    // The record stays claimed; later callers must not block on it.
    assert_eq!(
        h.dispatcher.ensure_dc_initialized(DcId::internal(6), true),
        Err(DispatchError::Closing)
    );
    assert!(h.created_for(6).is_empty());
}

#[test]
fn stop_releases_callers_waiting_on_an_unfinished_init() {
    let (entered_tx, entered_rx) = std_mpsc::channel();
    let (release_tx, release_rx) = std_mpsc::channel();
    let factory = MockFactory {
        hold_first_create: Mutex::new(Some((entered_tx, release_rx))),
        ..MockFactory::default()
    };
    let h = Harness::build(MemoryKeyValueStore::new(), factory);
    let dispatcher = &h.dispatcher;

    std::thread::scope(|scope| {
        // dc 3 init parks inside the factory while holding the dispatcher lock.
        let first = scope.spawn(|| dispatcher.ensure_dc_initialized(DcId::internal(3), true));
        entered_rx.recv().unwrap();

        // Queued on the lock ahead of the dc 4 initializer.
        let stopper = scope.spawn(|| dispatcher.stop());
        std::thread::sleep(Duration::from_millis(50));

        let initializer = scope.spawn(|| dispatcher.ensure_dc_initialized(DcId::internal(4), true));
        while !dispatcher.is_dc_inited(4) {
            std::thread::yield_now();
        }
        std::thread::sleep(Duration::from_millis(50));
        let waiter = scope.spawn(|| dispatcher.ensure_dc_initialized(DcId::internal(4), true));
        std::thread::sleep(Duration::from_millis(50));

        release_tx.send(()).unwrap();
        stopper.join().unwrap();
        assert_eq!(first.join().unwrap(), Ok(()));
        assert_eq!(waiter.join().unwrap(), Err(DispatchError::Closing));
        assert_eq!(initializer.join().unwrap(), Err(DispatchError::Closing));
    });

    assert!(dispatcher.is_stopping());
    assert!(h.created_for(4).is_empty());
}

#[test]
fn main_dc_is_read_from_store() {
    let h = Harness::build(MemoryKeyValueStore::with_entry(MAIN_DC_ID_KEY, "4"), MockFactory::default());
    assert_eq!(h.dispatcher.main_dc_id(), 4);

    let h = Harness::build(MemoryKeyValueStore::with_entry(MAIN_DC_ID_KEY, "x"), MockFactory::default());
    assert_eq!(h.dispatcher.main_dc_id(), 2);
}

#[test]
fn option_changes_reach_inited_groups() {
    let h = Harness::new();
    h.dispatcher.update_valid_dc(DcId::internal(2)).unwrap();
    h.dispatcher.update_valid_dc(DcId::internal(3)).unwrap();

    h.options.set_session_count(3);
    h.dispatcher.update_session_count();
    let updates: Vec<GroupEvent> = h
        .events()
        .into_iter()
        .filter(|event| matches!(event, GroupEvent::UpdateOptions(..)))
        .collect();
    assert_eq!(
        updates,
        vec![
            GroupEvent::UpdateOptions("SessionGroup:2:main".to_string(), 3, true),
            GroupEvent::UpdateOptions("SessionGroup:3:main".to_string(), 3, true),
        ]
    );

    h.factory.events.lock().clear();
    h.options.set_session_count(1);
    h.options.set_use_pfs(false);
    h.dispatcher.update_use_pfs();
    let events = h.events();
    assert_eq!(events.len(), 8);
    assert!(events
        .iter()
        .all(|event| matches!(event, GroupEvent::UpdateUsePfs(_, false))));
}

fn flood(seconds: &str) -> NetQuery {
    failed(DcId::main(), 420, &format!("FLOOD_WAIT_{}", seconds))
}

#[test]
fn backoff_follows_error_kind() {
    let config = DelayerConfig::default();
    assert_eq!(compute_backoff(&config, &flood("7")), Backoff::Retry(Duration::from_secs(7)));
    assert_eq!(compute_backoff(&config, &flood("100000")), Backoff::Fail);
    assert_eq!(
        compute_backoff(&config, &flood("300")),
        Backoff::Retry(config.max_flood_wait())
    );
    assert_eq!(compute_backoff(&config, &flood("301")), Backoff::Fail);
    assert_eq!(compute_backoff(&config, &flood("soon")), Backoff::Retry(Duration::from_secs(1)));

    let mut internal = failed(DcId::main(), 500, "INTERNAL");
    assert_eq!(compute_backoff(&config, &internal), Backoff::Retry(Duration::from_secs(1)));
    internal.bump_retry_count();
    internal.bump_retry_count();
    assert_eq!(compute_backoff(&config, &internal), Backoff::Retry(Duration::from_secs(4)));
    for _ in 0..20 {
        internal.bump_retry_count();
    }
    assert_eq!(compute_backoff(&config, &internal), Backoff::Retry(Duration::from_secs(60)));
}

fn harness_with_real_delayer() -> (Arc<NetQueryDispatcher>, Arc<MockFactory>) {
    let factory = Arc::new(MockFactory::default());
    let (default_sink, _sink) = QueryCallback::channel();
    let deps = DispatcherDeps {
        session_factory: factory.clone(),
        auth_manager: Arc::new(MockAuth::default()),
        store: Arc::new(MemoryKeyValueStore::new()),
        options: Arc::new(SharedOptions::default()),
        default_sink,
    };
    let dispatcher = NetQueryDispatcher::new(deps, |weak| {
        NetQueryDelayer::spawn(DelayerConfig::default(), weak) as Arc<dyn QueryDelayer>
    });
    (dispatcher, factory)
}

#[tokio::test(start_paused = true)]
async fn delayer_redispatches_after_backoff() {
    let (dispatcher, factory) = harness_with_real_delayer();
    dispatcher.dispatch(failed(DcId::main(), 500, "INTERNAL"));
    assert!(factory.sent.lock().is_empty());

    tokio::time::sleep(Duration::from_millis(1_100)).await;

    let sent = std::mem::take(&mut *factory.sent.lock());
    assert_eq!(sent.len(), 1);
    assert!(!sent[0].1.is_ready());
    assert_eq!(sent[0].1.retry_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn long_flood_wait_is_delivered() {
    let (dispatcher, factory) = harness_with_real_delayer();
    let (callback, mut results) = QueryCallback::channel();
    dispatcher.dispatch_with_callback(flood("86400"), callback);

    let query = results.recv().await.unwrap();
    assert_eq!(query.error().map(|e| e.code), Some(420));
    assert!(factory.sent.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_discards_delayed_queries() {
    let (dispatcher, factory) = harness_with_real_delayer();
    let (callback, mut results) = QueryCallback::channel();
    dispatcher.dispatch_with_callback(flood("5"), callback);
    dispatcher.stop();

    // The delayer drops the query, which closes its callback.
    assert!(results.recv().await.is_none());
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(factory.sent.lock().is_empty());
}
