//! Job record and the [`JobStore`] trait a backend implements.
//!
//! # Design Philosophy
//!
//! This module, like `JobStore` in the teacher workspace it's descended
//! from, owns interfaces only. Polling cadence, connection pooling,
//! ordering SQL, and advisory-lock bookkeeping all live in the backend
//! crate. A caller that only ever talks to `dyn JobStore` can swap
//! backends (or use an in-memory fake in tests) without changing anything
//! above this trait.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default priority assigned when an enqueue doesn't specify one. Lower
/// numbers run first; 1 is "highest" by convention.
pub const DEFAULT_PRIORITY: i16 = 50;

/// A job's payload: either a named module plus its arguments (dispatched
/// to a handler registered under that name at execution time, entirely
/// outside this crate) or an opaque term the core never interprets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// A `(module, args)` pair. `module` is looked up in a handler
    /// registry at dispatch time; this crate never inspects it.
    Module { module: String, args: Value },
    /// An opaque value with no module association.
    Opaque(Value),
}

impl JobPayload {
    /// The module name, if this payload names one. Used by the retry
    /// policy adapter to resolve a per-module retry schedule.
    pub fn module(&self) -> Option<&str> {
        match self {
            JobPayload::Module { module, .. } => Some(module.as_str()),
            JobPayload::Opaque(_) => None,
        }
    }

    /// The arguments carried by this payload, for passing to a retry
    /// policy or a handler. `Opaque` payloads have no separate "args" -
    /// the whole value is the argument.
    pub fn args(&self) -> &Value {
        match self {
            JobPayload::Module { args, .. } => args,
            JobPayload::Opaque(value) => value,
        }
    }
}

/// Options accepted by [`JobStore::enqueue`].
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// When absent, the job is eligible for claiming immediately.
    pub due_at: Option<DateTime<Utc>>,
    /// When absent, coerces to [`DEFAULT_PRIORITY`].
    pub priority: Option<i16>,
}

impl EnqueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn due_at(mut self, due_at: DateTime<Utc>) -> Self {
        self.due_at = Some(due_at);
        self
    }

    pub fn priority(mut self, priority: i16) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn resolved_priority(&self) -> i16 {
        self.priority.unwrap_or(DEFAULT_PRIORITY)
    }
}

/// A persisted job record.
///
/// Bookkeeping fields (`attempts`) live under [`Job::meta`], reserved for
/// internal state the way `rihanna_internal_meta` is in the schema this
/// type mirrors - callers should not assume it's limited to `attempts`
/// forever, which is why it's a free-form map rather than a dedicated
/// column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub payload: JobPayload,
    pub enqueued_at: DateTime<Utc>,
    pub due_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub fail_reason: Option<String>,
    pub priority: i16,
    pub meta: JobMeta,
}

impl Job {
    /// `true` once `mark_failed` has recorded a failure and before
    /// `retry_failed` clears it. Invariant (§3): this is equivalent to
    /// `fail_reason.is_some()`.
    pub fn is_failed(&self) -> bool {
        debug_assert_eq!(self.failed_at.is_some(), self.fail_reason.is_some());
        self.failed_at.is_some()
    }
}

/// `rihanna_internal_meta`: at minimum, the number of times this job has
/// been retried. Modeled as a struct with a typed `attempts` field plus an
/// `extra` bag for anything else a future version of this crate - or a
/// caller - stores alongside it, since the schema column is JSONB.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMeta {
    #[serde(default)]
    pub attempts: i32,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Default for JobMeta {
    fn default() -> Self {
        Self {
            attempts: 0,
            extra: serde_json::Map::new(),
        }
    }
}

/// Trait for claiming and transitioning jobs in a persistent store.
///
/// # Implementer notes
///
/// - `lock` must be atomic: selection, row-lock skip, and advisory-lock
///   acquisition colocated so two callers can never observe and then both
///   claim the same row.
/// - `lock`'s advisory-lock acquisition must never block; skip rows whose
///   lock can't be acquired immediately rather than waiting.
/// - The four `mark_*` methods operate on a job the caller already holds
///   the advisory lock for, and must release it on return (except where
///   noted - `mark_successful`'s release is a direct consequence of
///   deleting the row, since nothing is left to hold a lock on).
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job in the ready state.
    async fn enqueue(&self, payload: JobPayload, options: EnqueueOptions) -> Result<Job>;

    /// Insert many new jobs in one round trip.
    async fn enqueue_all(&self, items: Vec<(JobPayload, EnqueueOptions)>) -> Result<Vec<Job>>;

    /// Claim up to `n` ready jobs, ordered by (priority, due_at with NULL
    /// first, enqueued_at), excluding any id in `exclude_ids`. `n == 0`
    /// returns an empty vec without touching the store. Returns fewer than
    /// `n` when fewer are claimable - this is a normal outcome, not an
    /// error.
    async fn lock(&self, n: i64, exclude_ids: &[i64]) -> Result<Vec<Job>>;

    /// Delete the job and release its advisory lock. `Ok(0)` if the job
    /// had already been removed by another path.
    async fn mark_successful(&self, job: &Job) -> Result<u64>;

    /// Record a failure and release the advisory lock. `Ok(0)` if the job
    /// had already been removed by another path.
    async fn mark_failed(&self, job: &Job, when: DateTime<Utc>, reason: &str) -> Result<u64>;

    /// Reschedule the job and increment its attempt count, releasing the
    /// advisory lock. `Ok(0)` if the job had already been removed by
    /// another path.
    async fn mark_retried(&self, job: &Job, due_at: DateTime<Utc>) -> Result<u64>;

    /// Reschedule the job without touching its attempt count, clearing any
    /// failure, and releasing the advisory lock. `Ok(0)` if the job had
    /// already been removed by another path.
    async fn mark_reenqueued(&self, job: &Job, due_at: DateTime<Utc>) -> Result<u64>;

    /// Revert a failed job back to ready. Fails with a not-found error if
    /// the job doesn't exist or isn't currently failed; makes no changes
    /// in that case.
    async fn retry_failed(&self, id: i64) -> Result<Job>;
}
