//! Shared fixtures for exercising a [`rihanna_core::JobStore`] implementation
//! without repeating the same job-builder and timestamp-comparison
//! boilerplate in every backend's test suite.

use chrono::{DateTime, Duration, Utc};
use rihanna_core::{EnqueueOptions, JobPayload};

/// A `(module, args)` payload suitable for enqueueing in a test, with a
/// unique-ish module name so a test can pick its own jobs out of a table
/// shared with other concurrently running tests.
pub fn new_module_payload(module: impl Into<String>, args: serde_json::Value) -> JobPayload {
    JobPayload::Module {
        module: module.into(),
        args,
    }
}

/// Default enqueue options: due immediately, default priority.
pub fn ready_now() -> EnqueueOptions {
    EnqueueOptions::new()
}

/// Enqueue options for a job that isn't due yet.
pub fn due_in(delta: Duration) -> EnqueueOptions {
    EnqueueOptions::new().due_at(Utc::now() + delta)
}

/// Roundtripping a timestamp through Postgres can lose sub-millisecond
/// precision; compare within a tolerance instead of exact equality.
pub fn dates_close(left: &DateTime<Utc>, right: &DateTime<Utc>) -> bool {
    (*left - *right).abs() < Duration::milliseconds(1)
}
