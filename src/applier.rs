//! The apply capability consumed by the orchestrator

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{ItemId, Outcome};

/// Performs the remote update for one catalog item
///
/// This is the only action the orchestrator takes on the outside world. An
/// implementation may do network I/O, run its own sub-retries, or be a mock.
/// Return a typed [`Outcome`] for anything the orchestrator should react to;
/// `Err(_)` (and a panic inside `apply`) is recorded as
/// [`Outcome::PermanentFailure`] with the error text.
///
/// The orchestrator imposes no timeout on `apply`: bound it here if needed.
///
/// # Examples
///
/// ```no_run
/// use async_trait::async_trait;
/// use catalog_bulk::{ItemApplier, ItemId, Outcome, Result};
///
/// struct Stub;
///
/// #[async_trait]
/// impl ItemApplier for Stub {
///     async fn apply(&self, id: &ItemId) -> Result<Outcome> {
///         Ok(Outcome::Success {
///             message: Some(format!("updated {}", id)),
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait ItemApplier: Send + Sync + 'static {
    /// Attempt the update for `id`
    async fn apply(&self, id: &ItemId) -> Result<Outcome>;
}

/// [`ItemApplier`] backed by an async closure
pub struct FnApplier<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ItemApplier for FnApplier<F>
where
    F: Fn(ItemId) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    async fn apply(&self, id: &ItemId) -> Result<Outcome> {
        Ok((self.f)(id.clone()).await)
    }
}

/// Wrap an async closure as a shareable applier
///
/// ```no_run
/// use catalog_bulk::{Outcome, apply_fn};
///
/// let applier = apply_fn(|id| async move {
///     if id.to_string().starts_with("draft-") {
///         Outcome::permanent("drafts cannot be published")
///     } else {
///         Outcome::success()
///     }
/// });
/// ```
pub fn apply_fn<F, Fut>(f: F) -> Arc<dyn ItemApplier>
where
    F: Fn(ItemId) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    Arc::new(FnApplier { f })
}
