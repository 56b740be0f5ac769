//! Batch queue: authoritative item state and its atomic transitions.
//!
//! The queue is a plain struct; the orchestrator wraps it in a
//! `tokio::sync::Mutex`, so every method here runs as one atomic step with
//! respect to the workers.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::retry::retry_wait;
use crate::types::{ItemId, ItemStatus, Outcome, Stats, StatusChange, WorkItem};

/// Result of asking the queue for work
#[derive(Debug)]
pub(crate) enum Claim {
    /// Item moved to `Processing` for the caller
    Item(StatusChange),
    /// Only backoff-delayed items are waiting; the earliest is eligible at this instant
    NotBefore(Instant),
    /// No `Waiting` items remain
    Drained,
    /// The run was halted, cancelled or superseded
    Stopped,
}

/// Result of recording an apply outcome
#[derive(Debug)]
pub(crate) enum Settlement {
    /// Outcome written to the item
    Applied {
        change: StatusChange,
        /// Set when this outcome halted the run (first fatal failure only)
        halted: Option<String>,
        /// Backoff before the item becomes eligible again
        retry_in: Option<Duration>,
    },
    /// Outcome dropped (run cancelled or superseded, or item not in flight)
    Discarded,
}

#[derive(Debug, Default)]
pub(crate) struct BatchQueue {
    items: Vec<WorkItem>,
    index: HashMap<ItemId, usize>,
    /// Per-item backoff eligibility; `None` means ready now
    ready_at: Vec<Option<Instant>>,
    /// Incremented by every new run and by reset; stale workers are refused
    generation: u64,
    halted: Option<String>,
    cancelled: bool,
    /// Indices a retry run may claim; `None` means every item
    scope: Option<HashSet<usize>>,
    /// Halt of an earlier run that still covers `Waiting` items outside `scope`
    held_back: Option<String>,
}

impl BatchQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Replace the batch with fresh `Waiting` items
    ///
    /// Rejects duplicate ids without touching the current batch.
    pub(crate) fn seed(&mut self, ids: Vec<ItemId>) -> Result<()> {
        let mut seen = HashSet::with_capacity(ids.len());
        for id in &ids {
            if !seen.insert(id) {
                return Err(Error::DuplicateItem(id.clone()));
            }
        }

        self.index = ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.clone(), idx))
            .collect();
        self.ready_at = vec![None; ids.len()];
        self.items = ids.into_iter().map(WorkItem::new).collect();
        Ok(())
    }

    /// Start a new run over the current items and return its generation
    pub(crate) fn begin_run(&mut self) -> u64 {
        self.scope = None;
        self.held_back = None;
        self.next_generation()
    }

    /// Start a run that may only claim `ids`
    ///
    /// Other `Waiting` items are left alone. If the previous run halted, its
    /// halt stays in force for them.
    pub(crate) fn begin_scoped_run<'a>(
        &mut self,
        ids: impl IntoIterator<Item = &'a ItemId>,
    ) -> u64 {
        self.scope = Some(
            ids.into_iter()
                .filter_map(|id| self.index.get(id).copied())
                .collect(),
        );
        self.held_back = self.halted.take().or_else(|| self.held_back.take());
        self.next_generation()
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.halted = None;
        self.cancelled = false;
        self.generation
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Claim the first eligible `Waiting` item in batch order
    pub(crate) fn claim(&mut self, generation: u64, now: Instant) -> Claim {
        if generation != self.generation || self.cancelled || self.halted.is_some() {
            return Claim::Stopped;
        }

        let mut earliest: Option<Instant> = None;
        let mut ready = None;
        for (idx, item) in self.items.iter().enumerate() {
            if item.status != ItemStatus::Waiting {
                continue;
            }
            if self.scope.as_ref().is_some_and(|scope| !scope.contains(&idx)) {
                continue;
            }
            match self.ready_at[idx] {
                Some(at) if at > now => {
                    earliest = Some(earliest.map_or(at, |e| e.min(at)));
                }
                _ => {
                    ready = Some(idx);
                    break;
                }
            }
        }

        match (ready, earliest) {
            (Some(idx), _) => {
                // `ready` only ever points at a Waiting item
                debug_assert_eq!(self.items[idx].status, ItemStatus::Waiting);
                match self.mark_processing(idx) {
                    Some(change) => Claim::Item(change),
                    None => {
                        tracing::error!(index = idx, "Claimed item is not waiting, stopping worker");
                        Claim::Stopped
                    }
                }
            }
            (None, Some(at)) => Claim::NotBefore(at),
            (None, None) => Claim::Drained,
        }
    }

    /// `Waiting -> Processing` for one item; a no-op unless it is `Waiting`
    pub(crate) fn mark_processing(&mut self, idx: usize) -> Option<StatusChange> {
        let item = self.items.get_mut(idx)?;
        if item.status != ItemStatus::Waiting {
            tracing::debug!(
                item_id = %item.id,
                status = %item.status,
                "Claim ignored: item is not waiting"
            );
            return None;
        }
        item.status = ItemStatus::Processing;
        item.message = None;
        item.updated_at = Utc::now();
        self.ready_at[idx] = None;
        Some(self.change_for(idx))
    }

    /// Record the outcome of an apply call for an item in `Processing`
    pub(crate) fn settle(
        &mut self,
        generation: u64,
        id: &ItemId,
        outcome: Outcome,
        retry: &RetryConfig,
        now: Instant,
    ) -> Settlement {
        if generation != self.generation || self.cancelled {
            tracing::debug!(item_id = %id, "Discarding outcome of cancelled run");
            return Settlement::Discarded;
        }
        let Some(&idx) = self.index.get(id) else {
            return Settlement::Discarded;
        };
        if self.items[idx].status != ItemStatus::Processing {
            tracing::warn!(
                item_id = %id,
                status = %self.items[idx].status,
                "Outcome for an item that is not in flight, ignoring"
            );
            return Settlement::Discarded;
        }

        let mut halted = None;
        let mut retry_in = None;
        let item = &mut self.items[idx];
        match outcome {
            Outcome::Success { message } => {
                item.status = ItemStatus::Completed;
                item.message = message;
            }
            Outcome::PermanentFailure { message } => {
                item.status = ItemStatus::Failed;
                item.message = Some(message);
            }
            Outcome::RetryableFailure { kind, message } => {
                if item.attempt < retry.max_retries {
                    let delay = retry_wait(retry, item.attempt);
                    item.attempt += 1;
                    item.status = ItemStatus::Waiting;
                    item.message = Some(message);
                    self.ready_at[idx] = Some(now + delay);
                    retry_in = Some(delay);
                    tracing::warn!(
                        item_id = %id,
                        kind = ?kind,
                        attempt = item.attempt,
                        max_retries = retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Apply failed, item re-queued"
                    );
                } else {
                    tracing::error!(
                        item_id = %id,
                        kind = ?kind,
                        attempts = item.attempt,
                        "Apply failed after all retries exhausted"
                    );
                    item.status = ItemStatus::Failed;
                    item.message = Some(message);
                }
            }
            Outcome::FatalFailure { kind, message } => {
                item.status = ItemStatus::Failed;
                item.message = Some(message.clone());
                if self.halted.is_none() {
                    tracing::warn!(item_id = %id, kind = ?kind, "Fatal failure, halting dispatch");
                    self.halted = Some(message.clone());
                    halted = Some(message);
                }
            }
        }
        self.items[idx].updated_at = Utc::now();

        Settlement::Applied {
            change: self.change_for(idx),
            halted,
            retry_in,
        }
    }

    /// `Failed -> Waiting` for every failed item, attempt reset to 0
    pub(crate) fn requeue_failed(&mut self) -> Vec<StatusChange> {
        let failed: Vec<usize> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.status == ItemStatus::Failed)
            .map(|(idx, _)| idx)
            .collect();

        for &idx in &failed {
            let item = &mut self.items[idx];
            item.status = ItemStatus::Waiting;
            item.attempt = 0;
            item.message = None;
            item.updated_at = Utc::now();
            self.ready_at[idx] = None;
        }
        failed.into_iter().map(|idx| self.change_for(idx)).collect()
    }

    pub(crate) fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub(crate) fn halted(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    /// Halt message that still applies once the current run has drained
    ///
    /// Either this run halted, or a retry run left items of a halted batch
    /// `Waiting`.
    pub(crate) fn halt_in_force(&self) -> Option<&str> {
        self.halted().or_else(|| {
            let waiting = self.count(ItemStatus::Waiting) > 0;
            self.held_back.as_deref().filter(|_| waiting)
        })
    }

    /// Drop every item and invalidate the running generation
    pub(crate) fn reset(&mut self) {
        self.items.clear();
        self.index.clear();
        self.ready_at.clear();
        self.scope = None;
        self.held_back = None;
        self.next_generation();
    }

    pub(crate) fn stats(&self) -> Stats {
        Stats::from_items(&self.items)
    }

    pub(crate) fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub(crate) fn get(&self, id: &ItemId) -> Option<&WorkItem> {
        self.index.get(id).map(|&idx| &self.items[idx])
    }

    pub(crate) fn count(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }

    /// Ids not yet completed, in batch order
    pub(crate) fn remaining_ids(&self) -> Vec<ItemId> {
        self.items
            .iter()
            .filter(|item| item.status != ItemStatus::Completed)
            .map(|item| item.id.clone())
            .collect()
    }

    fn change_for(&self, idx: usize) -> StatusChange {
        let item = &self.items[idx];
        StatusChange {
            id: item.id.clone(),
            status: item.status,
            message: item.message.clone(),
            attempt: item.attempt,
            stats: self.stats(),
        }
    }
}
