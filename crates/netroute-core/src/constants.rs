//! Constants shared across the dispatcher and the resource manager.

/// Number of datacenter slots. Valid raw ids are `1..=MAX_DC_COUNT`.
pub const MAX_DC_COUNT: usize = 1000;

/// Main datacenter used until the backend redirects us elsewhere
pub const DEFAULT_MAIN_DC_ID: i32 = 2;

/// Key under which the main datacenter id is persisted
pub const MAIN_DC_ID_KEY: &str = "main_dc_id";

/// Error code asking the dispatcher to route the query again immediately
pub const RESEND_CODE: i32 = 202;

/// Backend redirect; the message names the new datacenter
pub const MIGRATE_CODE: i32 = 303;

/// Backend flood control; the message carries the wait in seconds
pub const FLOOD_WAIT_CODE: i32 = 420;

/// Backend internal error, also used locally for shutdown
pub const INTERNAL_ERROR_CODE: i32 = 500;

/// Code of errors raised by the dispatcher itself. Never retried.
pub const LOCAL_ERROR_CODE: i32 = 0;

/// Message prefixes recognized on a migrate error
pub const MIGRATE_PREFIXES: [&str; 3] = ["PHONE_MIGRATE_", "NETWORK_MIGRATE_", "USER_MIGRATE_"];

/// Message prefix of a flood-wait error
pub const FLOOD_WAIT_PREFIX: &str = "FLOOD_WAIT_";

/// Hops a query may take before it is failed
pub const DEFAULT_DISPATCH_TTL: i32 = 10;

/// Dispatch ttl value meaning "never expires"
pub const UNLIMITED_DISPATCH_TTL: i32 = -1;

/// Default shared transfer budget (2 MiB)
pub const DEFAULT_RESOURCE_LIMIT: i64 = 1 << 21;

/// Upload sessions opened per datacenter
pub const UPLOAD_SESSION_COUNT: i32 = 8;

/// Upload sessions opened for the datacenters in [`REDUCED_UPLOAD_DCS`]
pub const REDUCED_UPLOAD_SESSION_COUNT: i32 = 4;

/// Datacenters that get [`REDUCED_UPLOAD_SESSION_COUNT`] upload sessions
pub const REDUCED_UPLOAD_DCS: [i32; 2] = [2, 4];
