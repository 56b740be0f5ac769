use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::orchestrator::status::observer_fn;
use crate::orchestrator::test_helpers::{
    RecordingObserver, ScriptedApplier, create_test_orchestrator, ids, wait_settled,
};
use crate::types::{BatchOutcome, Event, ItemId, ItemStatus, Outcome};

#[tokio::test]
async fn test_observer_sees_processing_then_final_status() {
    let observer = Arc::new(RecordingObserver::default());
    let orchestrator = create_test_orchestrator(2).with_observer(observer.clone());
    let applier = Arc::new(
        ScriptedApplier::new(Outcome::success())
            .script(3, vec![Outcome::permanent("sku conflict")]),
    );

    orchestrator.start(ids(1..=4), applier).await.unwrap();
    wait_settled(&orchestrator).await;

    let changes = observer.changes.lock().unwrap();
    assert_eq!(changes.len(), 8);
    for id in ids(1..=4) {
        let statuses: Vec<_> = changes
            .iter()
            .filter(|c| c.id == id)
            .map(|c| c.status)
            .collect();
        let expected_final = if id == ItemId::from(3) {
            ItemStatus::Failed
        } else {
            ItemStatus::Completed
        };
        assert_eq!(statuses, vec![ItemStatus::Processing, expected_final]);
    }

    let failed = changes
        .iter()
        .find(|c| c.status == ItemStatus::Failed)
        .unwrap();
    assert_eq!(failed.message.as_deref(), Some("sku conflict"));

    let finished = observer.finished.lock().unwrap();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].stats.success, 3);
}

#[tokio::test]
async fn test_observer_stats_reflect_the_transition() {
    let observer = Arc::new(RecordingObserver::default());
    let orchestrator = create_test_orchestrator(1).with_observer(observer.clone());
    let applier = Arc::new(ScriptedApplier::new(Outcome::success()));

    orchestrator.start(ids(1..=3), applier).await.unwrap();
    wait_settled(&orchestrator).await;

    let completed: Vec<_> = observer
        .changes
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.status == ItemStatus::Completed)
        .map(|c| c.stats.completed)
        .collect();
    assert_eq!(completed, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_closure_observer_is_called() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let orchestrator = create_test_orchestrator(1).with_observer(observer_fn(move |change| {
        sink.lock().unwrap().push((change.id.clone(), change.status));
    }));

    orchestrator
        .start(ids(1..=1), Arc::new(ScriptedApplier::new(Outcome::success())))
        .await
        .unwrap();
    wait_settled(&orchestrator).await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (ItemId::from(1), ItemStatus::Processing),
            (ItemId::from(1), ItemStatus::Completed),
        ]
    );
}

#[tokio::test]
async fn test_event_stream_brackets_the_run() {
    let orchestrator = create_test_orchestrator(2);
    let mut events = orchestrator.subscribe();

    orchestrator
        .start(ids(1..=3), Arc::new(ScriptedApplier::new(Outcome::success())))
        .await
        .unwrap();
    wait_settled(&orchestrator).await;

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    assert!(matches!(
        received.first(),
        Some(Event::BatchStarted {
            total: 3,
            concurrency: 2
        })
    ));
    match received.last() {
        Some(Event::BatchFinished(summary)) => {
            assert_eq!(summary.outcome, BatchOutcome::Finished);
            assert_eq!(summary.stats.success, 3);
        }
        other => panic!("expected BatchFinished last, got: {:?}", other),
    }
    let item_events = received
        .iter()
        .filter(|e| matches!(e, Event::ItemStatusChanged(_)))
        .count();
    assert_eq!(item_events, 6);
}

#[tokio::test]
async fn test_halt_is_reported_once_per_run() {
    let observer = Arc::new(RecordingObserver::default());
    let orchestrator = create_test_orchestrator(3).with_observer(observer.clone());
    let mut events = orchestrator.subscribe();
    let applier = Arc::new(
        ScriptedApplier::new(Outcome::auth_invalid("401 unauthorized"))
            .with_delay(Duration::from_millis(20)),
    );

    orchestrator.start(ids(1..=3), applier.clone()).await.unwrap();
    let summary = wait_settled(&orchestrator).await;

    assert!(summary.is_halted());
    assert_eq!(applier.calls().len(), 3);
    assert_eq!(summary.stats.errors, 3);
    assert_eq!(observer.halts.lock().unwrap().len(), 1);

    let mut halted_events = 0;
    while let Ok(event) = events.try_recv() {
        if let Event::Halted { message, .. } = event {
            assert_eq!(message, "401 unauthorized");
            halted_events += 1;
        }
    }
    assert_eq!(halted_events, 1);
}

#[tokio::test]
async fn test_cancel_and_reset_emit_events() {
    let orchestrator = create_test_orchestrator(1);
    let mut events = orchestrator.subscribe();
    let applier = Arc::new(
        ScriptedApplier::new(Outcome::success()).with_delay(Duration::from_millis(50)),
    );

    orchestrator.start(ids(1..=3), applier).await.unwrap();
    orchestrator.cancel().await;
    let summary = wait_settled(&orchestrator).await;
    orchestrator.reset().await;

    assert_eq!(summary.outcome, BatchOutcome::Cancelled);
    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    assert!(received.iter().any(|e| matches!(e, Event::Cancelled)));
    assert!(matches!(received.last(), Some(Event::Reset)));
}
