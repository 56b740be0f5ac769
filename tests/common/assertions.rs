//! Custom test assertions for integration tests

use std::time::Duration;

use catalog_bulk::{BatchSummary, BulkOrchestrator, Event, Stats};

/// Wait for the current run to settle, panicking after `timeout`
pub async fn wait_for_summary(orchestrator: &BulkOrchestrator, timeout: Duration) -> BatchSummary {
    match tokio::time::timeout(timeout, orchestrator.wait()).await {
        Ok(summary) => summary,
        Err(_) => panic!("Batch did not settle within {:?}", timeout),
    }
}

/// Drain every event already buffered on `events`
pub fn drain_events(events: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

/// Assert the stats invariants that hold at every observation
pub fn assert_conserved(stats: &Stats) {
    assert_eq!(
        stats.total,
        stats.pending + stats.completed,
        "total must equal pending + completed: {:?}",
        stats
    );
    assert_eq!(
        stats.completed,
        stats.success + stats.errors,
        "completed must equal success + errors: {:?}",
        stats
    );
}
