//! Worker pool that drains the queue with a fixed number of concurrent workers.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::applier::ItemApplier;
use crate::config::RunOptions;
use crate::types::{BatchOutcome, BatchSummary, ItemId, Outcome, RunState};

use super::BulkOrchestrator;
use super::queue::{BatchQueue, Claim, Settlement};
use super::status::StatusNotifier;

/// Everything one worker needs, cloned per worker
struct WorkerContext {
    worker: usize,
    generation: u64,
    queue: Arc<Mutex<BatchQueue>>,
    applier: Arc<dyn ItemApplier>,
    options: Arc<RunOptions>,
    state_rx: watch::Receiver<RunState>,
    control: Arc<watch::Sender<RunState>>,
    cancel: CancellationToken,
    notifier: StatusNotifier,
}

impl BulkOrchestrator {
    /// Spawn `concurrency_limit` workers for `generation` plus a task that
    /// publishes the summary once all of them have exited
    ///
    /// The caller must already have set the run state to `Running` and cleared
    /// `done`.
    pub(crate) fn launch_workers(
        &self,
        generation: u64,
        applier: Arc<dyn ItemApplier>,
        options: Arc<RunOptions>,
        cancel: CancellationToken,
    ) {
        let handles: Vec<_> = (0..options.concurrency_limit)
            .map(|worker| {
                let ctx = WorkerContext {
                    worker,
                    generation,
                    queue: Arc::clone(&self.queue),
                    applier: Arc::clone(&applier),
                    options: Arc::clone(&options),
                    state_rx: self.control.subscribe(),
                    control: Arc::clone(&self.control),
                    cancel: cancel.clone(),
                    notifier: self.notifier.clone(),
                };
                tokio::spawn(run_worker(ctx))
            })
            .collect();

        let orchestrator = self.clone();
        tokio::spawn(async move {
            for result in futures::future::join_all(handles).await {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Worker task failed");
                }
            }
            orchestrator.finish_run(generation).await;
        });
    }

    /// Publish the summary of `generation` unless a newer run replaced it
    async fn finish_run(&self, generation: u64) {
        let queue = self.queue.lock().await;
        if queue.generation() != generation {
            tracing::debug!(generation, "Superseded run finished, summary dropped");
            return;
        }

        let outcome = if queue.is_cancelled() {
            BatchOutcome::Cancelled
        } else if let Some(message) = queue.halt_in_force() {
            BatchOutcome::Halted {
                message: message.to_string(),
            }
        } else {
            BatchOutcome::Finished
        };
        let final_state = if matches!(outcome, BatchOutcome::Halted { .. }) {
            RunState::Halted
        } else {
            RunState::Finished
        };
        let summary = BatchSummary {
            stats: queue.stats(),
            outcome,
        };

        // A retry run that drained while a halted batch still has waiting items stays halted
        self.control.send_if_modified(|state| {
            if *state == RunState::Running {
                *state = final_state;
                true
            } else {
                false
            }
        });
        drop(queue);

        tracing::info!(
            total = summary.stats.total,
            success = summary.stats.success,
            errors = summary.stats.errors,
            pending = summary.stats.pending,
            outcome = ?summary.outcome,
            "Batch run finished"
        );
        self.notifier.finished(&summary);

        // Waiters are released only after the finish notification went out
        let queue = self.queue.lock().await;
        if queue.generation() == generation {
            self.done.send_replace(Some(summary));
        }
    }
}

async fn run_worker(mut ctx: WorkerContext) {
    tracing::debug!(worker = ctx.worker, "Worker started");

    loop {
        if !ctx.wait_until_runnable().await {
            break;
        }

        let claim = {
            let mut queue = ctx.queue.lock().await;
            queue.claim(ctx.generation, Instant::now())
        };

        let change = match claim {
            Claim::Item(change) => change,
            Claim::NotBefore(at) => {
                // Only backed-off items left; wake at eligibility or on a control change
                tokio::select! {
                    _ = tokio::time::sleep_until(at) => {}
                    _ = ctx.state_rx.changed() => {}
                    _ = ctx.cancel.cancelled() => break,
                }
                continue;
            }
            Claim::Drained | Claim::Stopped => break,
        };

        let id = change.id.clone();
        ctx.notifier.item_changed(change);

        let outcome = tokio::select! {
            outcome = invoke(Arc::clone(&ctx.applier), id.clone()) => outcome,
            _ = ctx.cancel.cancelled() => {
                tracing::debug!(worker = ctx.worker, item_id = %id, "Cancelled while in flight, outcome discarded");
                break;
            }
        };

        let settlement = {
            let mut queue = ctx.queue.lock().await;
            queue.settle(
                ctx.generation,
                &id,
                outcome,
                &ctx.options.retry,
                Instant::now(),
            )
        };

        if let Settlement::Applied {
            change,
            halted,
            retry_in,
        } = settlement
        {
            if let Some(delay) = retry_in {
                tracing::debug!(
                    worker = ctx.worker,
                    item_id = %id,
                    delay_ms = delay.as_millis() as u64,
                    "Item backing off"
                );
            }
            ctx.notifier.item_changed(change);
            if let Some(message) = halted {
                ctx.halt(&id, &message);
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(ctx.options.inter_item_delay) => {}
            _ = ctx.cancel.cancelled() => break,
        }
    }

    tracing::debug!(worker = ctx.worker, "Worker exited");
}

impl WorkerContext {
    /// Block while paused; false once the run is halted or cancelled
    async fn wait_until_runnable(&mut self) -> bool {
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let state = *self.state_rx.borrow_and_update();
            match state {
                RunState::Paused => {
                    tokio::select! {
                        changed = self.state_rx.changed() => {
                            if changed.is_err() {
                                return false;
                            }
                        }
                        _ = self.cancel.cancelled() => return false,
                    }
                }
                RunState::Halted | RunState::Cancelled => return false,
                RunState::Idle | RunState::Running | RunState::Finished => return true,
            }
        }
    }

    fn halt(&self, id: &ItemId, message: &str) {
        self.control.send_if_modified(|state| {
            if matches!(state, RunState::Running | RunState::Paused) {
                *state = RunState::Halted;
                true
            } else {
                false
            }
        });
        tracing::warn!(
            item_id = %id,
            error = message,
            "Authentication failed, dispatch halted; re-authenticate to continue"
        );
        self.notifier.halted(id, message);
    }
}

/// Run one apply call in its own task
///
/// Errors and panics become permanent failures. Dropping the returned future
/// detaches the call instead of aborting it.
async fn invoke(applier: Arc<dyn ItemApplier>, id: ItemId) -> Outcome {
    let task_id = id.clone();
    let handle = tokio::spawn(async move { applier.apply(&task_id).await });

    match handle.await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            tracing::warn!(item_id = %id, error = %e, "Apply returned an error");
            Outcome::permanent(e.to_string())
        }
        Err(join_error) => {
            let message = if join_error.is_panic() {
                let panic = join_error.into_panic();
                panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "apply panicked".to_string())
            } else {
                "apply task was cancelled".to_string()
            };
            tracing::error!(item_id = %id, error = %message, "Apply task failed");
            Outcome::permanent(message)
        }
    }
}
