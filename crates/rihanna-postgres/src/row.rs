use chrono::{DateTime, Utc};
use rihanna_core::{Job, JobPayload};
use rihanna_core::job::JobMeta;
use sqlx::types::Json;
use sqlx::FromRow;

/// Maps one row of `rihanna_jobs` onto the backend-agnostic [`Job`]. Kept
/// separate from `Job` itself so the wire shape (JSONB columns wrapped in
/// `sqlx::types::Json`) never leaks past this crate.
#[derive(FromRow)]
pub(crate) struct JobRow {
    pub id: i64,
    pub payload: Json<JobPayload>,
    pub enqueued_at: DateTime<Utc>,
    pub due_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub fail_reason: Option<String>,
    pub priority: i16,
    pub rihanna_internal_meta: Json<JobMeta>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Job {
            id: row.id,
            payload: row.payload.0,
            enqueued_at: row.enqueued_at,
            due_at: row.due_at,
            failed_at: row.failed_at,
            fail_reason: row.fail_reason,
            priority: row.priority,
            meta: row.rihanna_internal_meta.0,
        }
    }
}

/// The same columns as [`JobRow`] plus the outcome of the non-blocking
/// advisory-lock attempt made in the same statement (§4.4). Rows where
/// `locked` is false were row-visible but lock-contended and must be
/// discarded rather than returned as claimed.
#[derive(FromRow)]
pub(crate) struct ClaimRow {
    #[sqlx(flatten)]
    pub job: JobRow,
    pub locked: bool,
}
