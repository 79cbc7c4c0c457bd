//! Per-worker resource ledger
//!
//! Amounts are in bytes of transfer budget. The worker owns
//! `estimated_limit`, `used`, `using` and `unit_size` and reports them to the
//! resource manager; the manager owns `limit` and sends it back with every
//! grant.

use std::fmt;

/// Resource usage and demand of one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceState {
    estimated_limit: i64,
    limit: i64,
    used: i64,
    using: i64,
    unit_size: i64,
}

impl Default for ResourceState {
    fn default() -> Self {
        Self {
            estimated_limit: 0,
            limit: 0,
            used: 0,
            using: 0,
            unit_size: 1,
        }
    }
}

impl ResourceState {
    /// Empty ledger with a grant granularity of one byte
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty ledger with the given grant granularity
    pub fn with_unit_size(unit_size: i64) -> Self {
        let mut state = Self::default();
        state.set_unit_size(unit_size);
        state
    }

    /// Reserve `amount` of the granted limit for an in-flight transfer
    pub fn start_use(&mut self, amount: i64) {
        self.using += amount;
        assert!(
            self.used + self.using <= self.limit,
            "resource overuse: {}",
            self
        );
    }

    /// Mark `amount` of in-flight usage as finished
    pub fn stop_use(&mut self, amount: i64) {
        assert!(amount <= self.using, "releasing {} of {}", amount, self);
        self.using -= amount;
        self.used += amount;
    }

    /// Add `extra` to the granted limit
    pub fn update_limit(&mut self, extra: i64) {
        self.limit += extra;
    }

    /// Report that `extra` more could be used on top of what is in flight.
    /// Returns true if the estimate changed.
    pub fn update_estimated_limit(&mut self, extra: i64) -> bool {
        let overlap = self.using.min(extra);
        let mut new_estimated_limit = self.used + self.using + extra - overlap;

        // Limit granted beyond the estimate is given up as used.
        if new_estimated_limit < self.limit {
            let surplus = self.limit - new_estimated_limit;
            self.used += surplus;
            new_estimated_limit += surplus;
        }

        if new_estimated_limit == self.estimated_limit {
            return false;
        }
        self.estimated_limit = new_estimated_limit;
        true
    }

    /// Set the grant granularity; values below one are clamped to one
    pub fn set_unit_size(&mut self, unit_size: i64) {
        self.unit_size = unit_size.max(1);
    }

    /// Granted limit still held (not yet returned as used)
    pub fn active_limit(&self) -> i64 {
        self.limit - self.used
    }

    /// Amount in flight
    pub fn using(&self) -> i64 {
        self.using
    }

    /// Amount consumed and released
    pub fn used(&self) -> i64 {
        self.used
    }

    /// Total granted limit
    pub fn limit(&self) -> i64 {
        self.limit
    }

    /// Total the worker could profitably hold
    pub fn estimated_limit(&self) -> i64 {
        self.estimated_limit
    }

    /// Granted but not yet reserved
    pub fn unused(&self) -> i64 {
        self.limit - self.using - self.used
    }

    /// Grant granularity
    pub fn unit_size(&self) -> i64 {
        self.unit_size
    }

    /// Additional limit the worker could use, rounded up to whole units
    pub fn estimated_extra(&self) -> i64 {
        let extra = (self.estimated_limit - self.limit).max(0);
        round_up(extra, self.unit_size)
    }

    /// Take the worker-owned fields from a worker report
    pub fn update_master(&mut self, other: &ResourceState) {
        self.estimated_limit = other.estimated_limit;
        self.used = other.used;
        self.using = other.using;
        self.unit_size = other.unit_size;
    }

    /// Take the manager-owned limit from a grant
    pub fn update_slave(&mut self, other: &ResourceState) {
        self.limit = other.limit;
    }
}

fn round_up(value: i64, unit: i64) -> i64 {
    (value + unit - 1) / unit * unit
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[estimated_limit:{} limit:{} used:{} using:{} unit_size:{}]",
            self.estimated_limit, self.limit, self.used, self.using, self.unit_size
        )
    }
}
