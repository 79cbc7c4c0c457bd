//! System utilities and metrics

/// Metrics collection
pub mod metrics;

pub use metrics::{Metrics, collect_metrics};
