//! Batch lifecycle control: start, pause, resume, cancel, reset and retry.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::applier::ItemApplier;
use crate::config::RunOptions;
use crate::error::{Error, Result};
use crate::types::{BatchOutcome, BatchSummary, Event, ItemId, ItemStatus, RunState, Stats};

use super::BulkOrchestrator;

impl BulkOrchestrator {
    /// Start a new batch with the configured run options
    ///
    /// See [`start_with`](Self::start_with).
    pub async fn start<I>(&self, ids: I, applier: Arc<dyn ItemApplier>) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<ItemId>,
    {
        let options = self.config.run.clone();
        self.start_with(ids, applier, options).await
    }

    /// Start a new batch
    ///
    /// Seeds the queue with one `Waiting` item per id (batch order preserved) and
    /// spawns `options.concurrency_limit` workers. Returns immediately; use
    /// [`wait`](Self::wait) or events to follow progress.
    ///
    /// # Errors
    ///
    /// - [`Error::BatchActive`] if workers of a previous run are still alive
    ///   (running, paused, or settling in-flight calls after a halt)
    /// - [`Error::DuplicateItem`] if an id appears twice
    /// - [`Error::Config`] if the options are invalid
    ///
    /// A finished, cancelled or settled halted batch is replaced.
    pub async fn start_with<I>(
        &self,
        ids: I,
        applier: Arc<dyn ItemApplier>,
        options: RunOptions,
    ) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<ItemId>,
    {
        options.validate()?;
        let ids: Vec<ItemId> = ids.into_iter().map(Into::into).collect();
        let options = Arc::new(options);

        let mut queue = self.queue.lock().await;
        self.ensure_not_active()?;
        queue.seed(ids)?;
        let generation = queue.begin_run();
        let total = queue.items().len();

        let cancel = {
            let mut run = self.run.lock().await;
            run.applier = Some(Arc::clone(&applier));
            run.options = Arc::clone(&options);
            run.cancel = CancellationToken::new();
            run.cancel.clone()
        };

        self.done.send_replace(None);
        self.control.send_replace(RunState::Running);
        drop(queue);

        tracing::info!(
            total,
            concurrency = options.concurrency_limit,
            max_retries = options.retry.max_retries,
            "Starting batch"
        );
        self.notifier.emit(Event::BatchStarted {
            total,
            concurrency: options.concurrency_limit,
        });
        self.launch_workers(generation, applier, options, cancel);
        Ok(())
    }

    /// Stop claiming new items
    ///
    /// Calls already in flight finish and settle. Idempotent; a no-op unless
    /// the batch is running.
    pub async fn pause(&self) {
        let paused = self.control.send_if_modified(|state| {
            if *state == RunState::Running {
                *state = RunState::Paused;
                true
            } else {
                false
            }
        });
        if paused {
            tracing::info!("Batch paused");
            self.notifier.emit(Event::Paused);
        }
    }

    /// Resume claiming after [`pause`](Self::pause)
    ///
    /// Idempotent; a no-op unless the batch is paused.
    pub async fn resume(&self) {
        let resumed = self.control.send_if_modified(|state| {
            if *state == RunState::Paused {
                *state = RunState::Running;
                true
            } else {
                false
            }
        });
        if resumed {
            tracing::info!("Batch resumed");
            self.notifier.emit(Event::Resumed);
        }
    }

    /// Hard stop
    ///
    /// Every worker stops at once. Apply calls already dispatched keep running
    /// detached, but their outcomes are discarded: those items stay `Processing`
    /// and should be treated as indeterminate. Idempotent.
    pub async fn cancel(&self) {
        let mut queue = self.queue.lock().await;
        if !self.is_active() || queue.is_cancelled() {
            return;
        }
        queue.cancel();
        self.run.lock().await.cancel.cancel();
        self.control.send_replace(RunState::Cancelled);
        let in_flight = queue.count(ItemStatus::Processing);
        drop(queue);

        tracing::info!(in_flight, "Batch cancelled");
        self.notifier.emit(Event::Cancelled);
    }

    /// Empty the queue
    ///
    /// Cancels a running batch first. Idempotent.
    pub async fn reset(&self) {
        let mut queue = self.queue.lock().await;
        let was_active = self.is_active();
        if was_active {
            self.run.lock().await.cancel.cancel();
        }
        queue.reset();
        self.control.send_replace(RunState::Idle);
        self.done.send_replace(Some(BatchSummary {
            stats: Stats::default(),
            outcome: if was_active {
                BatchOutcome::Cancelled
            } else {
                BatchOutcome::Finished
            },
        }));
        drop(queue);

        tracing::info!(was_active, "Batch reset");
        self.notifier.emit(Event::Reset);
    }

    /// Re-queue every `Failed` item (attempt reset to 0) and run them again
    ///
    /// Uses the applier and options of the last start. Only the re-queued
    /// items are dispatched; `Completed` items and any `Waiting` items left by
    /// a halt are untouched. After a halt the run therefore ends `Halted` again
    /// while such items remain, and [`resume_halted`](Self::resume_halted)
    /// continues them. Returns the number of items re-queued; with none, no
    /// workers are launched.
    ///
    /// # Errors
    ///
    /// - [`Error::BatchActive`] if workers are still alive
    /// - [`Error::RunCancelled`] if the last run was cancelled
    /// - [`Error::NoApplier`] if no batch was ever started
    pub async fn retry_failed(&self) -> Result<usize> {
        let mut queue = self.queue.lock().await;
        self.ensure_not_active()?;
        if queue.is_cancelled() {
            return Err(Error::RunCancelled);
        }

        let mut run = self.run.lock().await;
        let applier = run.applier.clone().ok_or(Error::NoApplier)?;

        let changes = queue.requeue_failed();
        if changes.is_empty() {
            return Ok(0);
        }
        let requeued = changes.len();
        let generation = queue.begin_scoped_run(changes.iter().map(|change| &change.id));
        let total = queue.items().len();
        run.cancel = CancellationToken::new();
        let cancel = run.cancel.clone();
        let options = Arc::clone(&run.options);
        drop(run);

        self.done.send_replace(None);
        self.control.send_replace(RunState::Running);
        drop(queue);

        tracing::info!(requeued, "Retrying failed items");
        for change in changes {
            self.notifier.item_changed(change);
        }
        self.notifier.emit(Event::BatchStarted {
            total,
            concurrency: options.concurrency_limit,
        });
        self.launch_workers(generation, applier, options, cancel);
        Ok(requeued)
    }

    /// Continue a halted batch with a new applier (e.g. refreshed credentials)
    ///
    /// Completed items are kept; the remaining `Waiting` items are dispatched.
    /// Items that failed, including the one that reported the authentication
    /// failure, stay `Failed` until [`retry_failed`](Self::retry_failed).
    /// Returns the number of `Waiting` items.
    ///
    /// # Errors
    ///
    /// - [`Error::BatchActive`] if in-flight calls are still settling
    /// - [`Error::RunCancelled`] if the last run was cancelled
    /// - [`Error::NotHalted`] if the last run did not halt
    pub async fn resume_halted(&self, applier: Arc<dyn ItemApplier>) -> Result<usize> {
        let mut queue = self.queue.lock().await;
        self.ensure_not_active()?;
        if queue.is_cancelled() {
            return Err(Error::RunCancelled);
        }
        let state = self.state();
        if state != RunState::Halted {
            return Err(Error::NotHalted { state });
        }

        let waiting = queue.count(ItemStatus::Waiting);
        let generation = queue.begin_run();
        let total = queue.items().len();
        let (cancel, options) = {
            let mut run = self.run.lock().await;
            run.applier = Some(Arc::clone(&applier));
            run.cancel = CancellationToken::new();
            (run.cancel.clone(), Arc::clone(&run.options))
        };

        self.done.send_replace(None);
        self.control.send_replace(RunState::Running);
        drop(queue);

        tracing::info!(waiting, "Resuming halted batch");
        self.notifier.emit(Event::BatchStarted {
            total,
            concurrency: options.concurrency_limit,
        });
        self.launch_workers(generation, applier, options, cancel);
        Ok(waiting)
    }

    /// Wait until the workers of the current run have exited
    ///
    /// Returns immediately with the last summary when nothing is running.
    pub async fn wait(&self) -> BatchSummary {
        let mut done_rx = self.done.subscribe();
        let summary = done_rx
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|summary| summary.clone());

        match summary {
            Some(summary) => summary,
            None => BatchSummary {
                stats: self.stats().await,
                outcome: BatchOutcome::Finished,
            },
        }
    }

    fn ensure_not_active(&self) -> Result<()> {
        if self.is_active() {
            return Err(Error::BatchActive {
                state: self.state(),
            });
        }
        Ok(())
    }
}
