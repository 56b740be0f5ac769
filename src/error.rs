//! Error types for catalog-bulk
//!
//! Per-item failures never show up here: they are recorded on the item and in the
//! batch [`Stats`](crate::types::Stats). This module covers misuse of the
//! orchestrator API (starting over an active batch, duplicate ids, bad
//! configuration) and the plumbing errors of the bundled HTTP applier, listing
//! fetch and exporter.

use crate::types::{ItemId, RunState};
use thiserror::Error;

/// Result type alias for catalog-bulk operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for catalog-bulk
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "concurrency_limit")
        key: Option<String>,
    },

    /// A batch is still running, paused or settling in-flight work
    #[error("a batch is already active (state: {state})")]
    BatchActive {
        /// The run state that prevented the operation
        state: RunState,
    },

    /// The same id was submitted twice to one batch
    #[error("duplicate item id in batch: {0}")]
    DuplicateItem(ItemId),

    /// `retry_failed` was called before any batch was started
    #[error("no applier available: start a batch first")]
    NoApplier,

    /// `resume_halted` was called on a batch that is not halted
    #[error("batch is not halted (state: {state})")]
    NotHalted {
        /// The current run state
        state: RunState,
    },

    /// `retry_failed` or `resume_halted` was called after the last run was
    /// cancelled; its detached items are indeterminate until `reset` or `start`
    #[error("the last run was cancelled: reset or start a new batch")]
    RunCancelled,

    /// A listing page could not be fetched
    #[error("listing page {page} failed: {message}")]
    Listing {
        /// 1-based page number
        page: u32,
        /// Reason for the failure
        message: String,
    },

    /// HTTP transport error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Invalid base URL for the HTTP applier
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV export error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error for a specific key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}
