//! Job queue repository for notification batches.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use tokio::sync::Notify;
use tracing::warn;
use uuid::Uuid;

use imagesuggest_core::{defaults, Error, JobQueue, JobStatus, QueuedBatch, Result, RunState};

/// PostgreSQL implementation of JobQueue.
pub struct PgJobRepository {
    pool: Pool<Postgres>,
    /// Notify handle for waking an idle worker on push.
    notify: Arc<Notify>,
}

impl PgJobRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Get the job notification handle for event-driven waking.
    pub fn job_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Parse a job row into a QueuedBatch.
    fn parse_job_row(row: sqlx::postgres::PgRow) -> Result<QueuedBatch> {
        let status: String = row.get("status");
        let payload: JsonValue = row.get("payload");
        Ok(QueuedBatch {
            id: row.get("id"),
            status: JobStatus::parse(&status)
                .ok_or_else(|| Error::Job(format!("Unknown job status: {}", status)))?,
            state: RunState::from_payload(&payload)?,
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        })
    }

    async fn finish(&self, id: Uuid, status: JobStatus, error: Option<&str>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE job_queue
             SET status = $2, error_message = $3, completed_at = $4
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Job {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for PgJobRepository {
    async fn push(&self, state: &RunState) -> Result<Uuid> {
        let job_id = Uuid::now_v7();

        sqlx::query(
            "INSERT INTO job_queue (id, job_type, status, payload, created_at)
             VALUES ($1, $2, 'pending', $3, $4)",
        )
        .bind(job_id)
        .bind(defaults::NOTIFICATIONS_JOB_TYPE)
        .bind(state.to_payload()?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        self.notify.notify_waiters();
        Ok(job_id)
    }

    async fn claim_next(&self) -> Result<Option<QueuedBatch>> {
        // SKIP LOCKED keeps two workers from claiming the same batch.
        let row = sqlx::query(
            "UPDATE job_queue
             SET status = 'running', started_at = $1
             WHERE id = (
                 SELECT id FROM job_queue
                 WHERE status = 'pending' AND job_type = $2
                 ORDER BY created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, status, payload, error_message, created_at, started_at, completed_at",
        )
        .bind(Utc::now())
        .bind(defaults::NOTIFICATIONS_JOB_TYPE)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id: Uuid = row.get("id");
        match Self::parse_job_row(row) {
            Ok(batch) => Ok(Some(batch)),
            Err(e) => {
                // Already marked running; fail it so it is not stranded.
                warn!(job_id = %id, error = %e, "Claimed job has an unreadable payload");
                self.fail(id, &format!("Unreadable job payload: {}", e))
                    .await?;
                Err(e)
            }
        }
    }

    async fn complete(&self, id: Uuid) -> Result<()> {
        self.finish(id, JobStatus::Completed, None).await
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<()> {
        self.finish(id, JobStatus::Failed, Some(error)).await
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM job_queue WHERE status = 'pending' AND job_type = $1",
        )
        .bind(defaults::NOTIFICATIONS_JOB_TYPE)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(count)
    }
}
