//! Paginated collection of catalog entries (e.g. the product list a batch is built from).

use std::future::Future;

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::retry::{IsRetryable, with_retry};

/// One page of a listing
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Entries on this page
    pub items: Vec<T>,
    /// Whether another page follows
    pub has_more: bool,
}

/// Failure fetching one page
#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    /// The API asked us to slow down; the page is fetched again after backoff
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// Any other failure; aborts the listing
    #[error("{0}")]
    Failed(String),
}

impl IsRetryable for ListingError {
    fn is_retryable(&self) -> bool {
        matches!(self, ListingError::RateLimited(_))
    }
}

/// Fetch pages 1, 2, ... until one reports `has_more == false`
///
/// A rate-limited page is retried with the backoff policy of `retry`; any other
/// failure (or exhausted retries) aborts the listing with [`Error::Listing`].
pub async fn collect_pages<T, F, Fut>(retry: &RetryConfig, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<Page<T>, ListingError>>,
{
    let mut collected = Vec::new();
    let mut page = 1u32;

    loop {
        let result = with_retry(retry, || fetch(page))
            .await
            .map_err(|e| Error::Listing {
                page,
                message: e.to_string(),
            })?;

        tracing::debug!(page, items = result.items.len(), has_more = result.has_more, "Fetched listing page");
        collected.extend(result.items);

        if !result.has_more {
            break;
        }
        page += 1;
    }

    tracing::info!(pages = page, items = collected.len(), "Listing collected");
    Ok(collected)
}
