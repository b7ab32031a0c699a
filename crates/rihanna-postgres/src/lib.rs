//! # rihanna-postgres
//!
//! A [`rihanna_core::JobStore`] backed by a `rihanna_jobs` table and
//! Postgres session-scoped advisory locks. `lock` claims a batch with a
//! single `FOR UPDATE SKIP LOCKED` + non-blocking `pg_try_advisory_lock`
//! statement; the four `mark_*` terminal transitions resolve a claim and
//! release its lock.
//!
//! The advisory lock taken during `lock` is scoped to the physical
//! connection the claim statement ran on, not to the pool. This crate
//! keeps that connection checked out - tracked per job id - until a
//! `mark_*` call resolves it, rather than returning it to the pool
//! between the claim and the resolution.
//!
//! # Usage
//!
//! ```rust,ignore
//! use rihanna_postgres::{PgJobStore, PgJobStoreConfig};
//!
//! let config = PgJobStoreConfig::new("postgres://localhost/mydb", 7823);
//! let pool = config.connect().await?;
//! let store = PgJobStore::new(pool, config.class_id);
//! ```

mod config;
mod error;
mod row;
mod store;

pub use config::PgJobStoreConfig;
pub use error::QueueError;
pub use store::PgJobStore;
