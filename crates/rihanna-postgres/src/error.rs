use thiserror::Error;

/// Errors surfaced by the Postgres backend itself, as distinct from the
/// backend-agnostic [`rihanna_core::CoreError`] variants a caller may also
/// see once this crate's methods are used through the `JobStore` trait
/// object (whose return type is `anyhow::Result`, so both travel the same
/// path out of this crate).
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
