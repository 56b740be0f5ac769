//! Test fixtures: configs and a scriptable in-memory catalog

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use catalog_bulk::{
    BulkOrchestrator, Config, ItemApplier, ItemId, Outcome, Result, RetryConfig, RunOptions,
};

/// Config with millisecond-scale delays
pub fn test_config(concurrency_limit: usize, max_retries: u32) -> Config {
    Config {
        run: RunOptions {
            concurrency_limit,
            inter_item_delay: Duration::from_millis(5),
            retry: RetryConfig {
                max_retries,
                initial_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(40),
                backoff_multiplier: 2.0,
                jitter: false,
            },
        },
        ..Default::default()
    }
}

pub fn create_orchestrator(concurrency_limit: usize, max_retries: u32) -> BulkOrchestrator {
    BulkOrchestrator::new(test_config(concurrency_limit, max_retries))
        .unwrap_or_else(|e| panic!("Failed to create orchestrator: {}", e))
}

pub fn product_ids(count: i64) -> Vec<ItemId> {
    (1..=count).map(ItemId::from).collect()
}

/// In-memory catalog that answers each update from a per-product script
///
/// Products without a script (or with an exhausted one) are updated successfully.
#[derive(Default)]
pub struct MockCatalog {
    scripts: Mutex<HashMap<ItemId, VecDeque<Outcome>>>,
    updates: Mutex<Vec<ItemId>>,
    delay: Duration,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(2),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn respond(self, id: i64, outcomes: Vec<Outcome>) -> Self {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(ItemId::from(id), outcomes.into());
        self
    }

    /// Every update received, in arrival order
    pub fn updates(&self) -> Vec<ItemId> {
        self.updates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn updates_for(&self, id: i64) -> usize {
        let id = ItemId::from(id);
        self.updates().iter().filter(|u| **u == id).count()
    }
}

#[async_trait]
impl ItemApplier for MockCatalog {
    async fn apply(&self, id: &ItemId) -> Result<Outcome> {
        self.updates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(id.clone());
        tokio::time::sleep(self.delay).await;

        let scripted = self
            .scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(id)
            .and_then(VecDeque::pop_front);
        Ok(scripted.unwrap_or_else(Outcome::success))
    }
}
