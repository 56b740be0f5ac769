//! Shared test helpers for exercising BulkOrchestrator in tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::applier::ItemApplier;
use crate::config::{Config, RetryConfig, RunOptions};
use crate::error::Result;
use crate::orchestrator::BulkOrchestrator;
use crate::orchestrator::status::StatusObserver;
use crate::types::{BatchSummary, ItemId, Outcome, StatusChange};

/// Run options with millisecond-scale delays so tests finish quickly
pub(crate) fn fast_options(concurrency_limit: usize, max_retries: u32) -> RunOptions {
    RunOptions {
        concurrency_limit,
        inter_item_delay: Duration::from_millis(5),
        retry: RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            jitter: false,
        },
    }
}

/// Orchestrator whose default run options are [`fast_options`]
pub(crate) fn create_test_orchestrator(concurrency_limit: usize) -> BulkOrchestrator {
    let config = Config {
        run: fast_options(concurrency_limit, 3),
        ..Default::default()
    };
    BulkOrchestrator::new(config).unwrap()
}

pub(crate) fn ids(range: std::ops::RangeInclusive<i64>) -> Vec<ItemId> {
    range.map(ItemId::from).collect()
}

/// Wait for the run to settle, failing the test after 5 seconds
pub(crate) async fn wait_settled(orchestrator: &BulkOrchestrator) -> BatchSummary {
    tokio::time::timeout(Duration::from_secs(5), orchestrator.wait())
        .await
        .expect("batch did not settle in time")
}

/// Applier that replays a per-item script of outcomes
///
/// Items without a script (or with an exhausted one) get the default outcome.
/// Tracks how many calls were in flight at once.
pub(crate) struct ScriptedApplier {
    scripts: Mutex<HashMap<ItemId, VecDeque<Outcome>>>,
    default: Outcome,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<ItemId>>,
    /// When set, every call waits for one permit before returning
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedApplier {
    pub(crate) fn new(default: Outcome) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default,
            delay: Duration::from_millis(2),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn script(self, id: impl Into<ItemId>, outcomes: Vec<Outcome>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(id.into(), outcomes.into_iter().collect());
        self
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn calls(&self) -> Vec<ItemId> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_for(&self, id: &ItemId) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == id).count()
    }
}

#[async_trait]
impl ItemApplier for ScriptedApplier {
    async fn apply(&self, id: &ItemId) -> Result<Outcome> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(id.clone());

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        tokio::time::sleep(self.delay).await;

        let outcome = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(|script| script.pop_front())
            .unwrap_or_else(|| self.default.clone());

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(outcome)
    }
}

/// Observer that records every notification
#[derive(Default)]
pub(crate) struct RecordingObserver {
    pub(crate) changes: Mutex<Vec<StatusChange>>,
    pub(crate) halts: Mutex<Vec<(ItemId, String)>>,
    pub(crate) finished: Mutex<Vec<BatchSummary>>,
}

impl StatusObserver for RecordingObserver {
    fn on_status_changed(&self, change: &StatusChange) {
        self.changes.lock().unwrap().push(change.clone());
    }

    fn on_halted(&self, id: &ItemId, message: &str) {
        self.halts
            .lock()
            .unwrap()
            .push((id.clone(), message.to_string()));
    }

    fn on_finished(&self, summary: &BatchSummary) {
        self.finished.lock().unwrap().push(summary.clone());
    }
}
