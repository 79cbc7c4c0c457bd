//! Metrics collection for the dispatch core
//!
//! Counters are registered once in a crate-owned Prometheus registry and
//! bumped from the dispatcher, the delayer and the resource manager.

use crate::types::Result;
use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, IntCounter, IntGauge,
    Registry,
};

/// Global metrics registry
static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Query routing counters
pub struct DispatchMetrics {
    /// Queries forwarded to a session group
    pub queries_forwarded: IntCounter,
    /// Finished queries handed to a callback or the default sink
    pub queries_delivered: IntCounter,
    /// Queries handed to the delayer
    pub queries_delayed: IntCounter,
    /// Queries failed for running out of dispatch hops
    pub ttl_exhausted: IntCounter,
    /// Queries dropped because the dispatcher was stopping
    pub queries_dropped: IntCounter,
    /// Main datacenter changes
    pub main_dc_migrations: IntCounter,
    /// Datacenters brought up
    pub dc_initializations: IntCounter,
}

/// Resource budget counters
pub struct ResourceMetrics {
    /// Workers registered
    pub workers_registered: IntCounter,
    /// Workers removed
    pub workers_removed: IntCounter,
    /// Grants sent to workers
    pub grants: IntCounter,
    /// Budget granted, in bytes
    pub granted_bytes: IntCounter,
    /// Budget currently held by workers
    pub active_budget: IntGauge,
}

/// Centralized metrics collection
pub struct Metrics {
    /// Dispatcher metrics
    pub dispatch: DispatchMetrics,
    /// Resource manager metrics
    pub resources: ResourceMetrics,
}

impl Metrics {
    /// Create new metrics instance
    fn new() -> Result<Self> {
        Ok(Self {
            dispatch: DispatchMetrics::new()?,
            resources: ResourceMetrics::new()?,
        })
    }

    /// Get the global metrics instance
    pub fn global() -> &'static Metrics {
        static INSTANCE: Lazy<Metrics> = Lazy::new(|| {
            Metrics::new().expect("Failed to initialize metrics")
        });
        &INSTANCE
    }
}

impl DispatchMetrics {
    fn new() -> Result<Self> {
        Ok(Self {
            queries_forwarded: register_int_counter_with_registry!(
                "nr_queries_forwarded_total",
                "Queries forwarded to a session group",
                REGISTRY
            )?,
            queries_delivered: register_int_counter_with_registry!(
                "nr_queries_delivered_total",
                "Finished queries delivered to callers",
                REGISTRY
            )?,
            queries_delayed: register_int_counter_with_registry!(
                "nr_queries_delayed_total",
                "Queries handed to the delayer",
                REGISTRY
            )?,
            ttl_exhausted: register_int_counter_with_registry!(
                "nr_dispatch_ttl_exhausted_total",
                "Queries failed after running out of dispatch hops",
                REGISTRY
            )?,
            queries_dropped: register_int_counter_with_registry!(
                "nr_queries_dropped_total",
                "Queries dropped during shutdown",
                REGISTRY
            )?,
            main_dc_migrations: register_int_counter_with_registry!(
                "nr_main_dc_migrations_total",
                "Main datacenter changes",
                REGISTRY
            )?,
            dc_initializations: register_int_counter_with_registry!(
                "nr_dc_initializations_total",
                "Datacenters brought up",
                REGISTRY
            )?,
        })
    }
}

impl ResourceMetrics {
    fn new() -> Result<Self> {
        Ok(Self {
            workers_registered: register_int_counter_with_registry!(
                "nr_workers_registered_total",
                "Workers registered with a resource manager",
                REGISTRY
            )?,
            workers_removed: register_int_counter_with_registry!(
                "nr_workers_removed_total",
                "Workers removed from a resource manager",
                REGISTRY
            )?,
            grants: register_int_counter_with_registry!(
                "nr_resource_grants_total",
                "Resource grants sent to workers",
                REGISTRY
            )?,
            granted_bytes: register_int_counter_with_registry!(
                "nr_resource_granted_bytes_total",
                "Budget granted to workers in bytes",
                REGISTRY
            )?,
            active_budget: register_int_gauge_with_registry!(
                "nr_resource_active_budget_bytes",
                "Budget currently held by workers",
                REGISTRY
            )?,
        })
    }
}

/// Initialize the metrics registry by creating the global metrics instance
pub fn init_registry() {
    let _ = Metrics::global();
}

/// Get the Prometheus registry
pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// Collect and return all metrics as a Prometheus-formatted string
pub fn collect_metrics() -> String {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = registry().gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
