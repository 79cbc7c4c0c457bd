//! Simulated backend and workload
//!
//! Every session group is a tokio task that answers queries after a short
//! latency and hands them back to the dispatcher. Accounts live on one "home"
//! datacenter; API queries reaching any other datacenter get a migrate
//! error. A small share of queries fails with internal or flood-wait errors
//! so the delayer gets exercised.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use anyhow::bail;
use bytes::Bytes;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use netroute_core::core::config::Config;
use netroute_core::core::options::SharedOptions;
use netroute_core::net::{
    AuthData, DcAuthManager, NetQueryDelayer, QueryDelayer, SessionGroup, SessionGroupFactory,
    SessionGroupOptions,
};
use netroute_core::storage::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
use netroute_core::{
    log_debug, log_info, log_warn, DcId, DispatcherDeps, NetQuery, NetQueryDispatcher,
    QueryCallback, QueryClass, QueryError, ResourceManager, ResourceState, WorkerLink,
};

const PART_SIZE: i64 = 128 * 1024;
const PARTS_PER_FILE: i64 = 24;
const INTERNAL_ERROR_RATE: f64 = 0.03;
const FLOOD_WAIT_RATE: f64 = 0.01;

type DispatcherCell = Arc<OnceCell<Weak<NetQueryDispatcher>>>;

/// Workload shape
#[derive(Debug, Clone, Copy)]
pub struct SimulationParams {
    /// API queries to submit
    pub queries: usize,
    /// Concurrent download workers
    pub workers: usize,
    /// Datacenters in the backend
    pub dc_count: i32,
}

/// What the run produced
#[derive(Debug, Default)]
pub struct SimulationReport {
    answered: usize,
    failed: usize,
    orphaned: usize,
    downloaded: i64,
    workers_finished: usize,
    home_dc: i32,
    main_dc_id: i32,
    elapsed: Duration,
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "netroute simulation finished in {:.2?}", self.elapsed)?;
        writeln!(f, "  accounts home dc:  {}", self.home_dc)?;
        writeln!(f, "  main dc at exit:   {}", self.main_dc_id)?;
        writeln!(f, "  queries answered:  {}", self.answered)?;
        writeln!(f, "  queries failed:    {}", self.failed)?;
        writeln!(f, "  orphan results:    {}", self.orphaned)?;
        writeln!(f, "  workers finished:  {}", self.workers_finished)?;
        write!(f, "  bytes downloaded:  {}", self.downloaded)
    }
}

struct Backend {
    home_dc: i32,
}

enum Outcome {
    Answer,
    Migrate(&'static str, i32),
    InternalError,
    FloodWait(u64),
}

impl Backend {
    fn outcome(&self, options: &SessionGroupOptions, query: &NetQuery) -> Outcome {
        let raw_dc_id = options.dc_id.raw_id().unwrap_or_default();
        if options.class == QueryClass::Common && raw_dc_id != self.home_dc {
            let prefix = if query.dc_id().is_main() { "USER_MIGRATE_" } else { "PHONE_MIGRATE_" };
            return Outcome::Migrate(prefix, self.home_dc);
        }
        let mut rng = rand::rng();
        if rng.random_bool(INTERNAL_ERROR_RATE) {
            Outcome::InternalError
        } else if rng.random_bool(FLOOD_WAIT_RATE) {
            Outcome::FloodWait(1)
        } else {
            Outcome::Answer
        }
    }
}

struct SimSessionGroup {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<NetQuery>>>,
}

impl SessionGroup for SimSessionGroup {
    fn send(&self, query: NetQuery) {
        let sent = match self.tx.lock().as_ref() {
            Some(tx) => tx.send(query).is_ok(),
            None => false,
        };
        if !sent {
            log_debug!("{} is closed, query dropped", self.name);
        }
    }

    fn update_options(&self, session_count: i32, use_pfs: bool) {
        log_debug!("{}: session_count {} use_pfs {}", self.name, session_count, use_pfs);
    }

    fn update_use_pfs(&self, use_pfs: bool) {
        log_debug!("{}: use_pfs {}", self.name, use_pfs);
    }

    fn update_main_flag(&self, is_main: bool) {
        log_info!("{}: is_main {}", self.name, is_main);
    }

    fn hangup(&self) {
        self.tx.lock().take();
    }
}

async fn serve_group(
    options: SessionGroupOptions,
    backend: Arc<Backend>,
    dispatcher: DispatcherCell,
    mut rx: mpsc::UnboundedReceiver<NetQuery>,
) {
    let latency = match options.class {
        QueryClass::Common => Duration::from_millis(2),
        _ => Duration::from_millis(8),
    };
    while let Some(mut query) = rx.recv().await {
        tokio::time::sleep(latency).await;
        match backend.outcome(&options, &query) {
            Outcome::Answer => {
                let answer = query.payload().clone();
                query.set_ok(answer);
            }
            Outcome::Migrate(prefix, dc) => {
                query.set_error(QueryError::new(303, format!("{}{}", prefix, dc)));
            }
            Outcome::InternalError => query.set_error(QueryError::new(500, "INTERNAL")),
            Outcome::FloodWait(seconds) => {
                query.set_error(QueryError::new(420, format!("FLOOD_WAIT_{}", seconds)));
            }
        }
        match dispatcher.get().and_then(Weak::upgrade) {
            Some(dispatcher) => dispatcher.dispatch(query),
            None => break,
        }
    }
    log_debug!("{} closed", options.name);
}

struct SimFactory {
    backend: Arc<Backend>,
    dispatcher: DispatcherCell,
}

impl SessionGroupFactory for SimFactory {
    fn create(&self, options: SessionGroupOptions) -> Arc<dyn SessionGroup> {
        let (tx, rx) = mpsc::unbounded_channel();
        let name = options.name.clone();
        log_debug!("Opening {} with {} sessions", name, options.session_count);
        tokio::spawn(serve_group(
            options,
            Arc::clone(&self.backend),
            Arc::clone(&self.dispatcher),
            rx,
        ));
        Arc::new(SimSessionGroup { name, tx: Mutex::new(Some(tx)) })
    }
}

struct LoggingAuthManager;

impl DcAuthManager for LoggingAuthManager {
    fn add_dc(&self, auth: Arc<AuthData>) {
        log_info!("Auth manager now tracks {}", auth.dc_id);
    }

    fn update_main_dc(&self, dc_id: DcId) {
        log_info!("Auth manager moved main to {}", dc_id);
    }
}

struct DownloadJob {
    index: usize,
    dc_id: DcId,
    priority: i32,
    part_size: i64,
    file_size: i64,
}

fn report_demand(state: &mut ResourceState, link: &WorkerLink, pending: i64) {
    state.update_estimated_limit(pending.min(state.unit_size() * 4));
    link.update_resources(state);
}

/// Download one file part by part, never holding more parts in flight than
/// the resource manager granted.
async fn run_worker(
    dispatcher: Arc<NetQueryDispatcher>,
    manager: ResourceManager,
    job: DownloadJob,
) -> anyhow::Result<i64> {
    let (grant_tx, mut grants) = mpsc::unbounded_channel();
    let link = manager.register_worker(grant_tx, job.priority).await?;
    let part = job.part_size;
    let mut state = ResourceState::with_unit_size(part);
    let (callback, mut results) = QueryCallback::channel();

    let mut pending = job.file_size;
    let mut in_flight = 0;
    let mut downloaded = 0;
    report_demand(&mut state, &link, pending);

    while pending > 0 || in_flight > 0 {
        tokio::select! {
            grant = grants.recv() => match grant {
                Some(grant) => state.update_slave(&grant.state),
                None => bail!("resource manager dropped worker {}", job.index),
            },
            Some(query) = results.recv() => {
                in_flight -= part;
                state.stop_use(part);
                if query.is_ok() {
                    downloaded += part;
                } else {
                    log_debug!("Worker {} part failed: {}", job.index, query);
                    pending += part;
                }
            }
        }

        while pending > 0 && state.unused() >= part {
            state.start_use(part);
            pending -= part;
            in_flight += part;
            let request = format!("worker {} offset {}", job.index, job.file_size - pending - part);
            let query = NetQuery::new(job.dc_id, QueryClass::Download, Bytes::from(request));
            dispatcher.dispatch_with_callback(query, callback.clone());
        }
        report_demand(&mut state, &link, pending);
    }

    log_info!("Worker {} finished {} bytes", job.index, downloaded);
    Ok(downloaded)
}

fn open_store(config: &Config) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    Ok(match &config.storage.path {
        Some(path) => Arc::new(FileKeyValueStore::open(path)?),
        None => Arc::new(MemoryKeyValueStore::new()),
    })
}

/// Run the workload to completion
pub async fn run(config: &Config, params: SimulationParams) -> anyhow::Result<SimulationReport> {
    let started = Instant::now();
    let backend = Arc::new(Backend {
        home_dc: rand::rng().random_range(1..=params.dc_count),
    });
    log_info!("Simulated backend keeps accounts on dc {}", backend.home_dc);

    let cell: DispatcherCell = Arc::new(OnceCell::new());
    let (default_sink, mut orphans) = QueryCallback::channel();
    let deps = DispatcherDeps {
        session_factory: Arc::new(SimFactory {
            backend: Arc::clone(&backend),
            dispatcher: Arc::clone(&cell),
        }),
        auth_manager: Arc::new(LoggingAuthManager),
        store: open_store(config)?,
        options: Arc::new(SharedOptions::from_config(&config.network)),
        default_sink,
    };
    let delayer_config = config.delayer.clone();
    let dispatcher = NetQueryDispatcher::new(deps, |weak| {
        NetQueryDelayer::spawn(delayer_config, weak) as Arc<dyn QueryDelayer>
    });
    let _ = cell.set(Arc::downgrade(&dispatcher));
    let (manager, manager_handle) = ResourceManager::from_config(&config.resources);

    let part_size = PART_SIZE.min(config.resources.max_resource_limit);
    let mut workers = JoinSet::new();
    for index in 0..params.workers {
        let job = DownloadJob {
            index,
            dc_id: DcId::internal(backend.home_dc),
            priority: (index % 3) as i32,
            part_size,
            file_size: part_size * PARTS_PER_FILE,
        };
        workers.spawn(run_worker(Arc::clone(&dispatcher), manager.clone(), job));
    }

    let (callback, mut results) = QueryCallback::channel();
    for i in 0..params.queries {
        let query = NetQuery::new(DcId::main(), QueryClass::Common, Bytes::from(format!("query {}", i)))
            .with_dispatch_ttl(config.network.default_dispatch_ttl);
        dispatcher.dispatch_with_callback(query, callback.clone());
    }
    drop(callback);

    let mut report = SimulationReport {
        home_dc: backend.home_dc,
        ..SimulationReport::default()
    };
    while let Some(query) = results.recv().await {
        if query.is_ok() {
            report.answered += 1;
        } else {
            log_debug!("Query failed: {}", query);
            report.failed += 1;
        }
    }

    while let Some(finished) = workers.join_next().await {
        match finished? {
            Ok(bytes) => {
                report.downloaded += bytes;
                report.workers_finished += 1;
            }
            Err(e) => log_warn!("Worker failed: {}", e),
        }
    }

    report.main_dc_id = dispatcher.main_dc_id();
    dispatcher.stop();
    manager.stop();
    manager_handle.await?;
    while orphans.try_recv().is_ok() {
        report.orphaned += 1;
    }
    report.elapsed = started.elapsed();
    Ok(report)
}
