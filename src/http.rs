//! HTTP-backed [`ItemApplier`] for REST catalog APIs.
//!
//! Sends one JSON request per item to `{base_url}/{id}` with a bearer token and
//! maps the response onto an [`Outcome`]:
//!
//! | Response                         | Outcome                         |
//! |----------------------------------|---------------------------------|
//! | 2xx                              | `Success`                       |
//! | 401, 403                         | `FatalFailure(AuthInvalid)`     |
//! | 429                              | `RetryableFailure(RateLimited)` |
//! | 408, 5xx, timeout, connect error | `RetryableFailure(Transient)`   |
//! | other 4xx                        | `PermanentFailure`              |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use url::Url;

use crate::applier::ItemApplier;
use crate::error::Result;
use crate::types::{ItemId, Outcome};

/// Default per-request timeout
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of characters of an error body kept in the item message
const BODY_EXCERPT_CHARS: usize = 200;

type PayloadFn = dyn Fn(&ItemId) -> Result<serde_json::Value> + Send + Sync;

/// Applies items by calling a REST endpoint
pub struct HttpApplier {
    client: reqwest::Client,
    base_url: Url,
    token: String,
    method: Method,
    payload: Arc<PayloadFn>,
}

impl HttpApplier {
    /// Create an applier that PUTs `payload(id)` to `{base_url}/{id}`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`](crate::Error::Url) if `base_url` is not a valid
    /// absolute URL.
    pub fn new<F>(base_url: &str, token: impl Into<String>, payload: F) -> Result<Self>
    where
        F: Fn(&ItemId) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        // Url::join replaces the last segment unless the base ends with '/'
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{}/", base_url))?
        };

        Ok(Self {
            client: build_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS))?,
            base_url,
            token: token.into(),
            method: Method::PUT,
            payload: Arc::new(payload),
        })
    }

    /// Use another HTTP method (e.g. PATCH or POST)
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Per-request timeout; an expired request counts as a transient failure
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    /// Endpoint for one item
    pub fn item_url(&self, id: &ItemId) -> Result<Url> {
        let segment = urlencoding::encode(&id.to_string()).into_owned();
        Ok(self.base_url.join(&segment)?)
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

#[async_trait]
impl ItemApplier for HttpApplier {
    async fn apply(&self, id: &ItemId) -> Result<Outcome> {
        let url = self.item_url(id)?;
        let body = (self.payload)(id)?;

        tracing::debug!(item_id = %id, method = %self.method, url = %url, "Sending update");

        let response = self
            .client
            .request(self.method.clone(), url.clone())
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Ok(Outcome::transient(format!("Request to {} timed out", url)));
            }
            Err(e) if e.is_connect() => {
                return Ok(Outcome::transient(format!("Connection failed for {}: {}", url, e)));
            }
            Err(e) => return Err(e.into()),
        };

        let status = response.status();
        if status.is_success() {
            return Ok(Outcome::success());
        }

        // The body is only needed for the failure message
        let body = response.text().await.unwrap_or_default();
        let outcome = classify_status(status, &body);
        tracing::debug!(item_id = %id, status = status.as_u16(), outcome = ?outcome, "Update rejected");
        Ok(outcome)
    }
}

/// Map a non-success HTTP status onto an outcome
pub fn classify_status(status: StatusCode, body: &str) -> Outcome {
    let excerpt = excerpt(body);
    let message = if excerpt.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, excerpt)
    };

    match status {
        s if s.is_success() => Outcome::success(),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Outcome::auth_invalid(message),
        StatusCode::TOO_MANY_REQUESTS => Outcome::rate_limited(message),
        StatusCode::REQUEST_TIMEOUT => Outcome::transient(message),
        s if s.is_server_error() => Outcome::transient(message),
        _ => Outcome::permanent(message),
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(BODY_EXCERPT_CHARS).collect();
    cut.push_str("...");
    cut
}
