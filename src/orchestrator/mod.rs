//! Bulk update orchestrator split into focused submodules.
//!
//! The `BulkOrchestrator` struct and its methods are organized by concern:
//! - [`queue`] - Item state machine (claim, settle, re-queue)
//! - [`control`] - Batch lifecycle (start, pause, resume, cancel, reset, retry)
//! - [`worker`] - Worker pool that drains the queue
//! - [`status`] - Status observer and event fan-out

mod control;
mod queue;
pub(crate) mod status;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::applier::ItemApplier;
use crate::config::{Config, RunOptions};
use crate::error::Result;
use crate::export::ResultTable;
use crate::types::{BatchOutcome, BatchSummary, Event, ItemId, RunState, Stats, WorkItem};

use queue::BatchQueue;
use status::StatusNotifier;

pub use status::{FnObserver, StatusObserver, observer_fn};

/// Parameters of the current (or last) run
pub(crate) struct RunContext {
    /// Applier of the last start; reused by `retry_failed`
    pub(crate) applier: Option<Arc<dyn ItemApplier>>,
    pub(crate) options: Arc<RunOptions>,
    /// Cancels every worker of the current run
    pub(crate) cancel: CancellationToken,
}

/// Drives one apply operation across a batch of catalog items
///
/// Cloneable; all clones share the same batch.
///
/// # Examples
///
/// ```no_run
/// use catalog_bulk::{BulkOrchestrator, Config, ItemId, Outcome, apply_fn};
///
/// # async fn example() -> catalog_bulk::Result<()> {
/// let orchestrator = BulkOrchestrator::new(Config::default())?;
/// let applier = apply_fn(|_id| async { Outcome::success() });
///
/// let ids: Vec<ItemId> = (1..=10).map(ItemId::from).collect();
/// orchestrator.start(ids, applier).await?;
///
/// let summary = orchestrator.wait().await;
/// println!("{}", summary.message());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BulkOrchestrator {
    pub(crate) config: Arc<Config>,
    pub(crate) queue: Arc<Mutex<BatchQueue>>,
    pub(crate) control: Arc<watch::Sender<RunState>>,
    /// `None` while workers of the current run are alive
    pub(crate) done: Arc<watch::Sender<Option<BatchSummary>>>,
    pub(crate) run: Arc<Mutex<RunContext>>,
    pub(crate) notifier: StatusNotifier,
}

impl BulkOrchestrator {
    /// Create an orchestrator with an empty queue
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(config.event_buffer);
        let (control, _rx) = watch::channel(RunState::Idle);
        let (done, _rx) = watch::channel(Some(BatchSummary {
            stats: Stats::default(),
            outcome: BatchOutcome::Finished,
        }));

        let run = RunContext {
            applier: None,
            options: Arc::new(config.run.clone()),
            cancel: CancellationToken::new(),
        };

        Ok(Self {
            config: Arc::new(config),
            queue: Arc::new(Mutex::new(BatchQueue::new())),
            control: Arc::new(control),
            done: Arc::new(done),
            run: Arc::new(Mutex::new(run)),
            notifier: StatusNotifier {
                event_tx,
                observer: None,
            },
        })
    }

    /// Register the synchronous status observer
    pub fn with_observer(mut self, observer: Arc<dyn StatusObserver>) -> Self {
        self.notifier.observer = Some(observer);
        self
    }

    /// Subscribe to orchestrator events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.notifier.event_tx.subscribe()
    }

    /// Configuration this orchestrator was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current run state
    pub fn state(&self) -> RunState {
        *self.control.borrow()
    }

    /// Whether workers of the current run are still alive
    pub fn is_active(&self) -> bool {
        self.done.borrow().is_none()
    }

    /// Stats derived from the current queue
    pub async fn stats(&self) -> Stats {
        self.queue.lock().await.stats()
    }

    /// Progress of the current batch in percent (0-100)
    pub async fn progress_percent(&self) -> u8 {
        self.stats().await.progress_percent()
    }

    /// Snapshot of every item in batch order
    pub async fn items(&self) -> Vec<WorkItem> {
        self.queue.lock().await.items().to_vec()
    }

    /// Snapshot of one item
    pub async fn item(&self, id: &ItemId) -> Option<WorkItem> {
        self.queue.lock().await.get(id).cloned()
    }

    /// Ids that have not completed successfully, in batch order
    ///
    /// After a halt, pass these to `start` with a fresh applier, or use
    /// `resume_halted` to keep the current batch.
    pub async fn remaining_ids(&self) -> Vec<ItemId> {
        self.queue.lock().await.remaining_ids()
    }

    /// One row per item of the most recent batch, unresolved items included
    pub async fn export_results(&self) -> ResultTable {
        ResultTable::from_items(self.queue.lock().await.items())
    }
}
