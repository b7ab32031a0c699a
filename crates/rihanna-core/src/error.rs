use thiserror::Error;

/// Errors surfaced directly by this crate's contracts, independent of any
/// particular backend's transport errors (those are the backend crate's
/// own error type - see `rihanna_postgres::QueueError`).
#[derive(Error, Debug)]
pub enum CoreError {
    /// `retry_failed` was called against a job that either doesn't exist
    /// or isn't currently in the `failed` state.
    #[error("job {0} not found (or not in a failed state)")]
    JobNotFound(i64),

    /// `lock` was asked for a negative claim count.
    #[error("claim count must be non-negative, got {0}")]
    InvalidClaimCount(i64),
}
