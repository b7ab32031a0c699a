use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use rihanna_core::job::JobMeta;
use rihanna_core::{async_trait, CoreError, EnqueueOptions, Job, JobPayload, JobStore};
use sqlx::pool::PoolConnection;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres};
use tokio::sync::Mutex as AsyncMutex;

use crate::error::QueueError;
use crate::row::{ClaimRow, JobRow};

const RETURNING_COLUMNS: &str = "id, payload, enqueued_at, due_at, failed_at, fail_reason, priority, rihanna_internal_meta";

/// A connection currently pinned to a claimed job's advisory lock. Held
/// out of the pool for the lifetime of the claim so the lock (session
/// scoped, §4.2) isn't silently released by the connection going back to
/// the pool and being handed to an unrelated caller.
type ClaimedConnection = Arc<AsyncMutex<PoolConnection<Postgres>>>;

/// A [`JobStore`] backed by a `rihanna_jobs` table and Postgres session
/// advisory locks. One instance is meant to be shared (it's `Send + Sync`
/// and cheap to clone the pool from) across every claim loop in a
/// process; the bookkeeping in `claims` is what lets `mark_*` find the
/// connection a given job's lock lives on.
pub struct PgJobStore {
    pool: PgPool,
    class_id: i64,
    claims: StdMutex<HashMap<i64, ClaimedConnection>>,
}

impl PgJobStore {
    pub fn new(pool: PgPool, class_id: i64) -> Self {
        Self {
            pool,
            class_id,
            claims: StdMutex::new(HashMap::new()),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn take_claim(&self, job_id: i64) -> Option<ClaimedConnection> {
        self.claims.lock().unwrap().remove(&job_id)
    }

    async fn enqueue_one(
        &self,
        payload: &JobPayload,
        options: &EnqueueOptions,
    ) -> Result<Job, QueueError> {
        let sql = format!(
            "INSERT INTO rihanna_jobs (payload, enqueued_at, due_at, priority, rihanna_internal_meta) \
             VALUES ($1, NOW(), $2, $3, $4) RETURNING {RETURNING_COLUMNS}"
        );
        let row: JobRow = sqlx::query_as(&sql)
            .bind(Json(payload))
            .bind(options.due_at)
            .bind(options.resolved_priority())
            .bind(Json(JobMeta::default()))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn enqueue(&self, payload: JobPayload, options: EnqueueOptions) -> anyhow::Result<Job> {
        Ok(self.enqueue_one(&payload, &options).await?)
    }

    async fn enqueue_all(
        &self,
        items: Vec<(JobPayload, EnqueueOptions)>,
    ) -> anyhow::Result<Vec<Job>> {
        if items.is_empty() {
            return Ok(vec![]);
        }

        let mut builder = sqlx::QueryBuilder::new(
            "INSERT INTO rihanna_jobs (payload, enqueued_at, due_at, priority, rihanna_internal_meta) ",
        );
        builder.push_values(items.iter(), |mut row, (payload, options)| {
            row.push_bind(Json(payload))
                .push("NOW()")
                .push_bind(options.due_at)
                .push_bind(options.resolved_priority())
                .push_bind(Json(JobMeta::default()));
        });
        builder.push(" RETURNING ");
        builder.push(RETURNING_COLUMNS);

        let rows: Vec<JobRow> = builder
            .build_query_as::<JobRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(QueueError::from)?;
        Ok(rows.into_iter().map(Job::from).collect())
    }

    async fn lock(&self, n: i64, exclude_ids: &[i64]) -> anyhow::Result<Vec<Job>> {
        if n < 0 {
            return Err(CoreError::InvalidClaimCount(n).into());
        }
        if n == 0 {
            return Ok(vec![]);
        }

        let sql = format!(
            "WITH candidate AS ( \
                 SELECT id FROM rihanna_jobs \
                 WHERE failed_at IS NULL \
                   AND (due_at IS NULL OR due_at <= NOW()) \
                   AND NOT (id = ANY($1)) \
                 ORDER BY priority ASC, due_at ASC NULLS FIRST, enqueued_at ASC \
                 LIMIT $2 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             SELECT j.{cols}, pg_try_advisory_lock($3, j.id) AS locked \
             FROM rihanna_jobs j \
             JOIN candidate c ON c.id = j.id \
             ORDER BY j.priority ASC, j.due_at ASC NULLS FIRST, j.enqueued_at ASC",
            cols = RETURNING_COLUMNS.replace(", ", ", j.")
        );

        let mut conn = self.pool.acquire().await.map_err(QueueError::from)?;

        // A single pass's `LIMIT n` is chosen before the advisory-lock try
        // runs, so a row that's row-unlocked but advisory-locked by some
        // other in-flight session consumes a slot in the window without
        // yielding a claim. Keep pulling batches past that window,
        // excluding every id already seen (claimed or lock-contended),
        // until either `n` locks are won or a batch comes back short of
        // its own limit (proof no further candidates remain).
        let mut seen: Vec<i64> = exclude_ids.to_vec();
        let mut claimed: Vec<ClaimRow> = Vec::new();
        let mut total_candidates = 0usize;
        loop {
            let remaining = n - claimed.len() as i64;
            if remaining <= 0 {
                break;
            }

            let rows: Vec<ClaimRow> = sqlx::query_as(&sql)
                .bind(seen.clone())
                .bind(remaining)
                .bind(self.class_id)
                .fetch_all(&mut *conn)
                .await
                .map_err(QueueError::from)?;

            let batch_len = rows.len();
            total_candidates += batch_len;
            for row in rows {
                seen.push(row.job.id);
                if row.locked {
                    claimed.push(row);
                }
            }

            if (batch_len as i64) < remaining {
                // the row-lock window wasn't even filled - no further
                // claimable candidates exist beyond what we've now seen.
                break;
            }
        }

        tracing::debug!(
            class_id = self.class_id,
            candidates = total_candidates,
            claimed = claimed.len(),
            "lock batch resolved"
        );
        if claimed.is_empty() {
            return Ok(vec![]);
        }

        let shared: ClaimedConnection = Arc::new(AsyncMutex::new(conn));
        let mut guard = self.claims.lock().unwrap();
        let jobs = claimed
            .into_iter()
            .map(|row| {
                let job: Job = row.job.into();
                guard.insert(job.id, shared.clone());
                job
            })
            .collect();
        drop(guard);
        Ok(jobs)
    }

    async fn mark_successful(&self, job: &Job) -> anyhow::Result<u64> {
        let affected = match self.take_claim(job.id) {
            Some(conn) => {
                let mut conn = conn.lock().await;
                let result = sqlx::query("DELETE FROM rihanna_jobs WHERE id = $1")
                    .bind(job.id)
                    .execute(&mut *conn)
                    .await
                    .map_err(QueueError::from)?;
                let _ = sqlx::query("SELECT pg_advisory_unlock($1, $2)")
                    .bind(self.class_id)
                    .bind(job.id)
                    .execute(&mut *conn)
                    .await;
                result.rows_affected()
            }
            None => sqlx::query("DELETE FROM rihanna_jobs WHERE id = $1")
                .bind(job.id)
                .execute(&self.pool)
                .await
                .map_err(QueueError::from)?
                .rows_affected(),
        };
        Ok(affected)
    }

    async fn mark_failed(
        &self,
        job: &Job,
        when: DateTime<Utc>,
        reason: &str,
    ) -> anyhow::Result<u64> {
        const SQL: &str = "UPDATE rihanna_jobs SET failed_at = $1, fail_reason = $2 WHERE id = $3";
        let affected = match self.take_claim(job.id) {
            Some(conn) => {
                let mut conn = conn.lock().await;
                let result = sqlx::query(SQL)
                    .bind(when)
                    .bind(reason)
                    .bind(job.id)
                    .execute(&mut *conn)
                    .await
                    .map_err(QueueError::from)?;
                let _ = sqlx::query("SELECT pg_advisory_unlock($1, $2)")
                    .bind(self.class_id)
                    .bind(job.id)
                    .execute(&mut *conn)
                    .await;
                result.rows_affected()
            }
            None => sqlx::query(SQL)
                .bind(when)
                .bind(reason)
                .bind(job.id)
                .execute(&self.pool)
                .await
                .map_err(QueueError::from)?
                .rows_affected(),
        };
        Ok(affected)
    }

    async fn mark_retried(&self, job: &Job, due_at: DateTime<Utc>) -> anyhow::Result<u64> {
        const SQL: &str = "UPDATE rihanna_jobs SET due_at = $1, rihanna_internal_meta = \
             jsonb_set(rihanna_internal_meta, '{attempts}', \
             to_jsonb(COALESCE((rihanna_internal_meta->>'attempts')::int, 0) + 1)) \
             WHERE id = $2";
        let affected = match self.take_claim(job.id) {
            Some(conn) => {
                let mut conn = conn.lock().await;
                let result = sqlx::query(SQL)
                    .bind(due_at)
                    .bind(job.id)
                    .execute(&mut *conn)
                    .await
                    .map_err(QueueError::from)?;
                let _ = sqlx::query("SELECT pg_advisory_unlock($1, $2)")
                    .bind(self.class_id)
                    .bind(job.id)
                    .execute(&mut *conn)
                    .await;
                result.rows_affected()
            }
            None => sqlx::query(SQL)
                .bind(due_at)
                .bind(job.id)
                .execute(&self.pool)
                .await
                .map_err(QueueError::from)?
                .rows_affected(),
        };
        Ok(affected)
    }

    async fn mark_reenqueued(&self, job: &Job, due_at: DateTime<Utc>) -> anyhow::Result<u64> {
        const SQL: &str =
            "UPDATE rihanna_jobs SET due_at = $1, failed_at = NULL, fail_reason = NULL WHERE id = $2";
        let affected = match self.take_claim(job.id) {
            Some(conn) => {
                let mut conn = conn.lock().await;
                let result = sqlx::query(SQL)
                    .bind(due_at)
                    .bind(job.id)
                    .execute(&mut *conn)
                    .await
                    .map_err(QueueError::from)?;
                let _ = sqlx::query("SELECT pg_advisory_unlock($1, $2)")
                    .bind(self.class_id)
                    .bind(job.id)
                    .execute(&mut *conn)
                    .await;
                result.rows_affected()
            }
            None => sqlx::query(SQL)
                .bind(due_at)
                .bind(job.id)
                .execute(&self.pool)
                .await
                .map_err(QueueError::from)?
                .rows_affected(),
        };
        Ok(affected)
    }

    async fn retry_failed(&self, id: i64) -> anyhow::Result<Job> {
        let sql = format!(
            "UPDATE rihanna_jobs SET failed_at = NULL, fail_reason = NULL, enqueued_at = NOW() \
             WHERE id = $1 AND failed_at IS NOT NULL RETURNING {RETURNING_COLUMNS}"
        );
        let row: Option<JobRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueueError::from)?;
        match row {
            Some(row) => Ok(row.into()),
            None => {
                tracing::warn!(job_id = id, "retry_failed found no failed job to revert");
                Err(CoreError::JobNotFound(id).into())
            }
        }
    }
}
