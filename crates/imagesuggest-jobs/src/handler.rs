//! Job handlers for queued batches.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use imagesuggest_core::{defaults, QueuedBatch, RunState, RunSummary};

use crate::scheduler::{BatchOutcome, BatchScheduler};

/// Context provided to job handlers.
pub struct JobContext {
    /// The batch being processed.
    pub batch: QueuedBatch,
}

impl JobContext {
    pub fn new(batch: QueuedBatch) -> Self {
        Self { batch }
    }

    pub fn job_id(&self) -> Uuid {
        self.batch.id
    }

    pub fn state(&self) -> &RunState {
        &self.batch.state
    }
}

/// Result of job execution.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    /// Batch ran; carries the cumulative run summary when the batch produced state.
    Success(Option<RunSummary>),
    /// Batch could not run or its successor could not be scheduled.
    Failed(String),
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type this handler processes.
    fn job_type(&self) -> &'static str;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobResult;

    /// Check if this handler can process the given job type.
    fn can_handle(&self, job_type: &str) -> bool {
        self.job_type() == job_type
    }
}

/// Runs one queued notification batch and queues its successor.
pub struct NotificationsJob {
    scheduler: Arc<BatchScheduler>,
}

impl NotificationsJob {
    pub fn new(scheduler: Arc<BatchScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl JobHandler for NotificationsJob {
    fn job_type(&self) -> &'static str {
        defaults::NOTIFICATIONS_JOB_TYPE
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let outcome = match self.scheduler.run_batch(ctx.batch.state).await {
            // A batch queued without the queue flag finishes its run here.
            Ok(BatchOutcome::RunNext(state)) => self.scheduler.run_to_completion(state).await,
            other => other,
        };

        match outcome {
            Ok(BatchOutcome::Exhausted) => JobResult::Success(None),
            Ok(BatchOutcome::MaxJobsReached(state))
            | Ok(BatchOutcome::UsersExhausted(state))
            | Ok(BatchOutcome::Queued { state, .. })
            | Ok(BatchOutcome::RunNext(state)) => JobResult::Success(Some(state.summary())),
            Err(e) => JobResult::Failed(e.to_string()),
        }
    }
}
