//! Queries and their completion state
//!
//! A [`NetQuery`] is created by a caller, mutated in place while it travels
//! between the dispatcher, session groups and the delayer, and finally handed
//! back through its [`QueryCallback`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::constants::{
    DEFAULT_DISPATCH_TTL, INTERNAL_ERROR_CODE, LOCAL_ERROR_CODE, RESEND_CODE, UNLIMITED_DISPATCH_TTL,
};
use crate::types::DcId;

static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(1);

/// Which session group inside a datacenter handles a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryClass {
    /// Regular API calls
    Common,
    /// File part uploads
    Upload,
    /// Large file part downloads
    Download,
    /// Small file downloads (thumbnails and the like)
    DownloadSmall,
}

impl QueryClass {
    /// Short name used in session group names and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryClass::Common => "main",
            QueryClass::Upload => "upload",
            QueryClass::Download => "download",
            QueryClass::DownloadSmall => "download_small",
        }
    }
}

/// Error carried by a finished query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    /// Backend or local error code
    pub code: i32,
    /// Error message
    pub message: String,
}

impl QueryError {
    /// Create an error with the given code and message
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// Error set on queries dispatched after shutdown
    pub fn closing() -> Self {
        Self::new(INTERNAL_ERROR_CODE, "Internal Server Error: closing")
    }

    /// Error set when a query runs out of dispatch hops
    pub fn dispatch_ttl() -> Self {
        Self::new(LOCAL_ERROR_CODE, "DispatchTtlError")
    }

    /// Error set when the destination datacenter cannot be brought up
    pub fn no_such_dc(dc_id: DcId) -> Self {
        Self::new(LOCAL_ERROR_CODE, format!("No such dc {}", dc_id))
    }

    /// Error asking the dispatcher to route the query again
    pub fn resend() -> Self {
        Self::new(RESEND_CODE, "Resend")
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Error : {} : {}]", self.code, self.message)
    }
}

/// Completion state of a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryState {
    /// Waiting for a result
    Pending,
    /// Finished with an answer
    Ok(Bytes),
    /// Finished with an error
    Error(QueryError),
}

/// Where a finished query is delivered
///
/// Wraps the sending half of a channel. Delivering to a callback whose
/// receiver has been dropped is a no-op.
#[derive(Debug, Clone)]
pub struct QueryCallback {
    tx: mpsc::UnboundedSender<NetQuery>,
}

impl QueryCallback {
    /// Create a callback and the receiver its results arrive on
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<NetQuery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Wrap an existing sender
    pub fn from_sender(tx: mpsc::UnboundedSender<NetQuery>) -> Self {
        Self { tx }
    }

    /// Hand the query over. Returns false if the receiver is gone.
    pub fn deliver(&self, query: NetQuery) -> bool {
        self.tx.send(query).is_ok()
    }

    /// Whether the receiving side has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// One outgoing RPC call
#[derive(Debug)]
pub struct NetQuery {
    id: u64,
    dc_id: DcId,
    class: QueryClass,
    dispatch_ttl: i32,
    state: QueryState,
    payload: Bytes,
    callback: Option<QueryCallback>,
    retry_count: u32,
}

impl NetQuery {
    /// Create a pending query with the default dispatch ttl
    pub fn new(dc_id: DcId, class: QueryClass, payload: Bytes) -> Self {
        Self {
            id: NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed),
            dc_id,
            class,
            dispatch_ttl: DEFAULT_DISPATCH_TTL,
            state: QueryState::Pending,
            payload,
            callback: None,
            retry_count: 0,
        }
    }

    /// Set the dispatch ttl; negative means unlimited
    pub fn with_dispatch_ttl(mut self, ttl: i32) -> Self {
        self.dispatch_ttl = ttl;
        self
    }

    /// Process-unique query id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Destination datacenter as addressed (may be main)
    pub fn dc_id(&self) -> DcId {
        self.dc_id
    }

    /// Query class
    pub fn class(&self) -> QueryClass {
        self.class
    }

    /// Request payload
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Remaining dispatch hops
    pub fn dispatch_ttl(&self) -> i32 {
        self.dispatch_ttl
    }

    /// Use up one dispatch hop. Unlimited ttl is left untouched.
    pub fn consume_dispatch_ttl(&mut self) {
        if self.dispatch_ttl > 0 {
            self.dispatch_ttl -= 1;
        }
    }

    /// Whether the ttl never runs out
    pub fn has_unlimited_ttl(&self) -> bool {
        self.dispatch_ttl <= UNLIMITED_DISPATCH_TTL
    }

    /// Current completion state
    pub fn state(&self) -> &QueryState {
        &self.state
    }

    /// True once the query carries an answer or an error
    pub fn is_ready(&self) -> bool {
        !matches!(self.state, QueryState::Pending)
    }

    /// True if the query finished with an error
    pub fn is_error(&self) -> bool {
        matches!(self.state, QueryState::Error(_))
    }

    /// True if the query finished with an answer
    pub fn is_ok(&self) -> bool {
        matches!(self.state, QueryState::Ok(_))
    }

    /// The error, if the query failed
    pub fn error(&self) -> Option<&QueryError> {
        match &self.state {
            QueryState::Error(error) => Some(error),
            _ => None,
        }
    }

    /// The answer, if the query succeeded
    pub fn answer(&self) -> Option<&Bytes> {
        match &self.state {
            QueryState::Ok(answer) => Some(answer),
            _ => None,
        }
    }

    /// Finish with an answer
    pub fn set_ok(&mut self, answer: Bytes) {
        self.state = QueryState::Ok(answer);
    }

    /// Finish with an error
    pub fn set_error(&mut self, error: QueryError) {
        self.state = QueryState::Error(error);
    }

    /// Back to pending, same destination
    pub fn resend(&mut self) {
        self.state = QueryState::Pending;
    }

    /// Back to pending, explicitly addressed to `dc_id`
    pub fn resend_to(&mut self, dc_id: DcId) {
        self.dc_id = dc_id;
        self.state = QueryState::Pending;
    }

    /// Attach the callback the result is delivered to
    pub fn set_callback(&mut self, callback: QueryCallback) {
        self.callback = Some(callback);
    }

    /// Detach the callback for delivery
    pub fn take_callback(&mut self) -> Option<QueryCallback> {
        self.callback.take()
    }

    /// Whether a callback is attached
    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Drop payload and callback of an abandoned query
    pub fn clear(&mut self) {
        self.payload = Bytes::new();
        self.callback = None;
    }

    /// Number of times the delayer has retried this query
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Record one more delayed retry
    pub fn bump_retry_count(&mut self) {
        self.retry_count = self.retry_count.saturating_add(1);
    }
}

impl fmt::Display for NetQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Query:{} {} {} ttl={}", self.id, self.dc_id, self.class.as_str(), self.dispatch_ttl)?;
        match &self.state {
            QueryState::Pending => write!(f, " pending]"),
            QueryState::Ok(answer) => write!(f, " ok {}b]", answer.len()),
            QueryState::Error(error) => write!(f, " {}]", error),
        }
    }
}
