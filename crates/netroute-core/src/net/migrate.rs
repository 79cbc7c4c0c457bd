//! Migrate error parsing

use crate::constants::{FLOOD_WAIT_PREFIX, MIGRATE_PREFIXES};

/// A recognized migrate redirect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrateTarget {
    /// Prefix that matched, e.g. `USER_MIGRATE_`
    pub prefix: &'static str,
    /// Raw target datacenter id; 0 if the suffix is not a number
    pub raw_dc_id: i32,
}

/// Parse a migrate error message. Returns `None` if no known prefix matches.
pub fn parse_migrate(message: &str) -> Option<MigrateTarget> {
    MIGRATE_PREFIXES.iter().find_map(|&prefix| {
        let suffix = message.strip_prefix(prefix)?;
        Some(MigrateTarget {
            prefix,
            raw_dc_id: suffix.parse().unwrap_or(0),
        })
    })
}

/// Seconds requested by a `FLOOD_WAIT_<n>` message
pub fn parse_flood_wait(message: &str) -> Option<u64> {
    message.strip_prefix(FLOOD_WAIT_PREFIX)?.parse().ok()
}
