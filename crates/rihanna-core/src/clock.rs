use chrono::{DateTime, Duration, Utc};

/// The current instant, in UTC. All scheduling in this crate is done in
/// terms of this function so that "now" always means "the Rust process's
/// clock", not whatever the database server's clock happens to read.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// A point `delta` in the future, for callers computing a `due_at` or
/// retry schedule (e.g. `due_in(Duration::seconds(30))`).
pub fn due_in(delta: Duration) -> DateTime<Utc> {
    now() + delta
}
