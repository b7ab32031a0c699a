//! # rihanna-core
//!
//! Backend-agnostic types for a durable, database-backed job queue: the
//! [`Job`] record, the [`JobStore`] trait a backend implements, the
//! advisory-lock [`ClassId`] namespace, and the [`RetryPolicy`] adapter.
//!
//! ## Design
//!
//! The queue's source of truth is a relational table. Producers call
//! [`JobStore::enqueue`]; workers call [`JobStore::lock`] to atomically
//! claim a batch of jobs, execute user code (outside this crate's
//! concern), then resolve each claimed job with exactly one of
//! [`JobStore::mark_successful`], [`JobStore::mark_failed`],
//! [`JobStore::mark_retried`], or [`JobStore::mark_reenqueued`].
//! Coordination across workers - possibly on different hosts - is
//! delegated entirely to the backend's row locking and session-scoped
//! advisory locks; this crate only describes the contract.
//!
//! This crate owns interfaces only. Which backend to use, how workers
//! poll, and how retry schedules are chosen for a given job module are
//! policy decisions that belong to the backend implementation
//! (`rihanna-postgres`) and to the caller, not to this crate.

mod clock;
mod error;
pub mod job;
mod lock;
mod retry;

pub use clock::{due_in, now};
pub use error::CoreError;
pub use job::{EnqueueOptions, Job, JobPayload, JobStore, DEFAULT_PRIORITY};
pub use lock::ClassId;
pub use retry::{NoopRetryPolicy, RetryPolicy, RetryPolicyRegistry};

// Re-export commonly used external types, the way the teacher workspace does
// for async_trait, so implementors don't need their own dependency on it.
pub use async_trait::async_trait;
