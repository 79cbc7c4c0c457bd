//! Core configuration, runtime options and logging

/// Application configuration
pub mod config;

/// Runtime-updatable network options
pub mod options;

/// Logging macros
pub mod logging;

// Re-export commonly used items
pub use config::{Config, load_config, load_config_or_default};
pub use options::{NetOptions, SharedOptions};
