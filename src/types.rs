//! Core types for catalog-bulk

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier of a remote catalog entry
///
/// Catalog platforms hand out either numeric or string ids, so both are accepted.
/// Serializes untagged: `42` or `"sku-42"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    /// Numeric id
    Int(i64),
    /// String id (handles, SKUs, GIDs)
    Str(String),
}

impl From<i64> for ItemId {
    fn from(id: i64) -> Self {
        ItemId::Int(id)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        ItemId::Str(id.to_string())
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        ItemId::Str(id)
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemId::Int(id) => write!(f, "{}", id),
            ItemId::Str(id) => f.write_str(id),
        }
    }
}

/// Work item status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Waiting to be claimed by a worker
    Waiting,
    /// Claimed; the apply call is in flight
    Processing,
    /// Apply succeeded
    Completed,
    /// Apply failed and will not be retried automatically
    Failed,
}

impl ItemStatus {
    /// Whether the item has reached a final state for this pass
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed)
    }

    /// Human-readable label used in exports
    pub fn label(&self) -> &'static str {
        match self {
            ItemStatus::Waiting => "Pending",
            ItemStatus::Processing => "In progress",
            ItemStatus::Completed => "Success",
            ItemStatus::Failed => "Error",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ItemStatus::Waiting => "waiting",
            ItemStatus::Processing => "processing",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One unit of work: a catalog id plus its current state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Target catalog entry
    pub id: ItemId,
    /// Current status
    pub status: ItemStatus,
    /// Last status detail (success note or failure reason)
    pub message: Option<String>,
    /// Number of retries scheduled so far (0 until the first retryable failure)
    pub attempt: u32,
    /// Time of the last transition
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    /// Create a fresh `Waiting` item
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            status: ItemStatus::Waiting,
            message: None,
            attempt: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Kind of a retryable failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryableKind {
    /// Remote API throttled the request (HTTP 429 and friends)
    RateLimited,
    /// Timeouts, connection resets, 5xx responses
    Transient,
}

/// Kind of a fatal failure that halts the whole batch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalKind {
    /// Credentials rejected; every further call would fail the same way
    AuthInvalid,
}

/// Result of one apply attempt
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Remote update applied
    Success {
        /// Optional detail to show next to the item
        message: Option<String>,
    },
    /// Worth retrying after a backoff delay
    RetryableFailure {
        /// Why the call failed
        kind: RetryableKind,
        /// Failure detail
        message: String,
    },
    /// Stops dispatch for the whole batch
    FatalFailure {
        /// Why the call failed
        kind: FatalKind,
        /// Failure detail
        message: String,
    },
    /// Will fail again on retry (validation errors, missing item)
    PermanentFailure {
        /// Failure detail
        message: String,
    },
}

impl Outcome {
    /// Plain success with no message
    pub fn success() -> Self {
        Outcome::Success { message: None }
    }

    /// Rate-limited retryable failure
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Outcome::RetryableFailure {
            kind: RetryableKind::RateLimited,
            message: message.into(),
        }
    }

    /// Transient retryable failure
    pub fn transient(message: impl Into<String>) -> Self {
        Outcome::RetryableFailure {
            kind: RetryableKind::Transient,
            message: message.into(),
        }
    }

    /// Authentication failure
    pub fn auth_invalid(message: impl Into<String>) -> Self {
        Outcome::FatalFailure {
            kind: FatalKind::AuthInvalid,
            message: message.into(),
        }
    }

    /// Permanent failure
    pub fn permanent(message: impl Into<String>) -> Self {
        Outcome::PermanentFailure {
            message: message.into(),
        }
    }
}

/// Aggregate counters derived from the queue
///
/// Always computed from item states; the orchestrator keeps no separate counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Items in the batch
    pub total: usize,
    /// Completed + Failed
    pub completed: usize,
    /// Completed only
    pub success: usize,
    /// Failed only
    pub errors: usize,
    /// Waiting + Processing
    pub pending: usize,
}

impl Stats {
    /// Derive counters from a set of items
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a WorkItem>) -> Self {
        let mut stats = Stats::default();
        for item in items {
            stats.total += 1;
            match item.status {
                ItemStatus::Completed => stats.success += 1,
                ItemStatus::Failed => stats.errors += 1,
                ItemStatus::Waiting | ItemStatus::Processing => stats.pending += 1,
            }
        }
        stats.completed = stats.success + stats.errors;
        stats
    }

    /// Progress in percent (0-100), 0 for an empty batch
    pub fn progress_percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let percent = (self.completed as f64 * 100.0 / self.total as f64).round();
        percent.clamp(0.0, 100.0) as u8
    }
}

/// Orchestrator run state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// No batch, or the batch was reset
    Idle,
    /// Workers are claiming items
    Running,
    /// Workers stop claiming until resumed
    Paused,
    /// A fatal failure stopped dispatch; in-flight calls may still be settling
    Halted,
    /// Hard-stopped by the caller
    Cancelled,
    /// Every worker exited after draining the queue
    Finished,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::Halted => "halted",
            RunState::Cancelled => "cancelled",
            RunState::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// A single item transition, with stats recomputed right after it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Item that changed
    pub id: ItemId,
    /// Its new status
    pub status: ItemStatus,
    /// Its new message
    pub message: Option<String>,
    /// Its retry count
    pub attempt: u32,
    /// Batch stats including this transition
    pub stats: Stats,
}

/// How a run ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// The queue drained
    Finished,
    /// Dispatch stopped on an authentication failure
    Halted {
        /// The fatal failure message
        message: String,
    },
    /// The caller cancelled the run
    Cancelled,
}

/// Final report for one run of the worker pool
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Stats at the moment the last worker exited
    pub stats: Stats,
    /// How the run ended
    pub outcome: BatchOutcome,
}

impl BatchSummary {
    /// Whether the run stopped on an authentication failure
    pub fn is_halted(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Halted { .. })
    }

    /// Caller-facing summary line
    pub fn message(&self) -> String {
        match &self.outcome {
            BatchOutcome::Finished => format!(
                "{} of {} succeeded",
                self.stats.success, self.stats.total
            ),
            BatchOutcome::Halted { .. } => format!(
                "Authentication failed: re-authenticate to continue ({} of {} succeeded, {} pending)",
                self.stats.success, self.stats.total, self.stats.pending
            ),
            BatchOutcome::Cancelled => format!(
                "Cancelled after {} of {} items",
                self.stats.completed, self.stats.total
            ),
        }
    }
}

/// Event emitted by the orchestrator
///
/// Subscribe with [`BulkOrchestrator::subscribe`](crate::BulkOrchestrator::subscribe).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Workers launched over a batch
    BatchStarted {
        /// Items in the batch
        total: usize,
        /// Number of workers
        concurrency: usize,
    },

    /// An item changed state
    ItemStatusChanged(StatusChange),

    /// Dispatch paused
    Paused,

    /// Dispatch resumed
    Resumed,

    /// Authentication failure stopped dispatch (emitted once per run)
    Halted {
        /// Item whose apply reported the failure
        id: ItemId,
        /// Failure detail
        message: String,
    },

    /// Run cancelled by the caller
    Cancelled,

    /// Last worker exited
    BatchFinished(BatchSummary),

    /// Queue cleared
    Reset,
}
