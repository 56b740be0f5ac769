//! Status notifications: the synchronous observer and the event broadcast.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::types::{BatchSummary, Event, ItemId, StatusChange};

/// Synchronous callback for item transitions
///
/// Called from the worker that performed the transition, right after the queue
/// lock is released, so implementations may read the orchestrator but should
/// return quickly.
pub trait StatusObserver: Send + Sync {
    /// An item changed status; `change.stats` already reflects the transition
    fn on_status_changed(&self, change: &StatusChange);

    /// Dispatch was halted by an authentication failure (once per run)
    fn on_halted(&self, _id: &ItemId, _message: &str) {}

    /// The last worker of a run exited
    fn on_finished(&self, _summary: &BatchSummary) {}
}

/// [`StatusObserver`] backed by a closure over status changes
pub struct FnObserver<F> {
    f: F,
}

impl<F> StatusObserver for FnObserver<F>
where
    F: Fn(&StatusChange) + Send + Sync,
{
    fn on_status_changed(&self, change: &StatusChange) {
        (self.f)(change)
    }
}

/// Wrap a closure as a status observer
pub fn observer_fn<F>(f: F) -> Arc<dyn StatusObserver>
where
    F: Fn(&StatusChange) + Send + Sync + 'static,
{
    Arc::new(FnObserver { f })
}

/// Fans notifications out to the observer and the event channel
#[derive(Clone)]
pub(crate) struct StatusNotifier {
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) observer: Option<Arc<dyn StatusObserver>>,
}

impl StatusNotifier {
    pub(crate) fn item_changed(&self, change: StatusChange) {
        tracing::debug!(
            item_id = %change.id,
            status = %change.status,
            attempt = change.attempt,
            completed = change.stats.completed,
            total = change.stats.total,
            "Item status changed"
        );
        if let Some(observer) = &self.observer {
            observer.on_status_changed(&change);
        }
        // No subscribers is fine
        let _ = self.event_tx.send(Event::ItemStatusChanged(change));
    }

    pub(crate) fn halted(&self, id: &ItemId, message: &str) {
        if let Some(observer) = &self.observer {
            observer.on_halted(id, message);
        }
        let _ = self.event_tx.send(Event::Halted {
            id: id.clone(),
            message: message.to_string(),
        });
    }

    pub(crate) fn finished(&self, summary: &BatchSummary) {
        if let Some(observer) = &self.observer {
            observer.on_finished(summary);
        }
        let _ = self.event_tx.send(Event::BatchFinished(summary.clone()));
    }

    pub(crate) fn emit(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }
}
