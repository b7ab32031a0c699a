use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::error::QueueError;

/// Pool and lock-namespace configuration for a [`crate::PgJobStore`],
/// designed to be passable across API boundaries (config files, env vars)
/// the way the teacher workspace's `PoolConfig` is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PgJobStoreConfig {
    pub db_url: String,
    /// The advisory-lock class id (§4.2). Must be identical across every
    /// worker and producer cooperating on the same queue.
    pub class_id: i64,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_seconds: Option<u64>,
    pub max_lifetime_seconds: Option<u64>,
    pub idle_timeout_seconds: Option<u64>,
}

impl PgJobStoreConfig {
    pub fn new(db_url: impl Into<String>, class_id: i64) -> Self {
        Self {
            db_url: db_url.into(),
            class_id,
            max_connections: None,
            min_connections: None,
            acquire_timeout_seconds: None,
            max_lifetime_seconds: None,
            idle_timeout_seconds: None,
        }
    }

    pub async fn connect(&self) -> Result<PgPool, QueueError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections.unwrap_or(10))
            .min_connections(self.min_connections.unwrap_or(1))
            .max_lifetime(Duration::from_secs(self.max_lifetime_seconds.unwrap_or(300)))
            .idle_timeout(Duration::from_secs(self.idle_timeout_seconds.unwrap_or(60)))
            .acquire_timeout(Duration::from_secs(
                self.acquire_timeout_seconds.unwrap_or(30),
            ))
            .connect(&self.db_url)
            .await?;

        Ok(pool)
    }
}
