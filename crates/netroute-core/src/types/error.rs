//! Error types and handling for the dispatch core
//!
//! Query failures are not represented here: they travel inside the query as a
//! [`QueryError`](crate::types::QueryError) and reach the caller through its
//! callback. The types below cover setup, persistence and datacenter
//! initialization.

use thiserror::Error;
use crate::types::DcId;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the dispatch core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Datacenter initialization errors
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// An actor's mailbox is closed
    #[error("Actor closed: {0}")]
    Closed(String),

    /// I/O errors from std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors from the file store
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Config file parse errors
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Prometheus metrics errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Reasons a datacenter could not be brought up
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Main or empty id where an exact datacenter was required
    #[error("Not exact DC: {0}")]
    NotExactDc(DcId),

    /// Raw id outside `1..=MAX_DC_COUNT`
    #[error("Too big DC id: {0}")]
    DcIdOutOfRange(DcId),

    /// Datacenter was never initialized and initialization was not forced
    #[error("Invalid DC: {0}")]
    InvalidDc(DcId),

    /// Dispatcher is shutting down
    #[error("Closing")]
    Closing,
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a closed-mailbox error
    pub fn closed(actor: impl Into<String>) -> Self {
        Self::Closed(actor.into())
    }
}
