//! # catalog-bulk
//!
//! Bulk update orchestrator for remote catalog APIs.
//!
//! Give it a list of item ids and an async "apply" operation; it runs the
//! operation over every item with a bounded worker pool, retries throttled and
//! transient failures with exponential backoff, halts dispatch on an
//! authentication failure, and keeps per-item status that can be exported as a
//! flat table.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Agnostic apply** - The orchestrator never knows how an item is updated
//! - **Event-driven** - Consumers subscribe to events or register an observer
//! - **Nothing silently dropped** - Every submitted item appears in the export
//!
//! ## Quick Start
//!
//! ```no_run
//! use catalog_bulk::{BulkOrchestrator, Config, ItemId, Outcome, apply_fn};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = BulkOrchestrator::new(Config::default())?;
//!
//!     // Subscribe to events
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let applier = apply_fn(|_id: ItemId| async { Outcome::success() });
//!     orchestrator.start(1..=50i64, applier).await?;
//!
//!     let summary = orchestrator.wait().await;
//!     println!("{}", summary.message());
//!     print!("{}", orchestrator.export_results().await.to_csv()?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// The apply capability
pub mod applier;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Result table export (CSV, JSON)
pub mod export;
/// HTTP-backed applier
pub mod http;
/// Paginated listing fetch
pub mod listing;
/// Bulk orchestrator (decomposed into focused submodules)
pub mod orchestrator;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use applier::{FnApplier, ItemApplier, apply_fn};
pub use config::{Config, RetryConfig, RunOptions};
pub use error::{Error, Result};
pub use export::{ResultRow, ResultTable};
pub use http::HttpApplier;
pub use listing::{ListingError, Page, collect_pages};
pub use orchestrator::{BulkOrchestrator, FnObserver, StatusObserver, observer_fn};
pub use types::{
    BatchOutcome, BatchSummary, Event, FatalKind, ItemId, ItemStatus, Outcome, RetryableKind,
    RunState, Stats, StatusChange, WorkItem,
};
