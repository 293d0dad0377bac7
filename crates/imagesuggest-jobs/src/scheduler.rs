//! Drives a run batch by batch, in-process or through the job queue.

use std::sync::Arc;

use tracing::{error, info, instrument};
use uuid::Uuid;

use imagesuggest_core::{Error, JobQueue, ReplicationGate, Result, RunState};

use crate::factory::NotifierFactory;

/// What happened after a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// The page stream ran dry; the run is over.
    Exhausted,
    /// The batch cap was reached; holds the final state.
    MaxJobsReached(RunState),
    /// A category run has no listed user left; holds the final state.
    UsersExhausted(RunState),
    /// The next batch was handed to the job queue.
    Queued { job_id: Uuid, state: RunState },
    /// The next batch should run in-process.
    RunNext(RunState),
}

/// Schedules notification batches.
///
/// Batches of one run never overlap: the next one is scheduled only after
/// the previous returned its state.
pub struct BatchScheduler {
    factory: Arc<dyn NotifierFactory>,
    queue: Option<Arc<dyn JobQueue>>,
    replication: Option<Arc<dyn ReplicationGate>>,
}

impl BatchScheduler {
    pub fn new(factory: Arc<dyn NotifierFactory>) -> Self {
        Self {
            factory,
            queue: None,
            replication: None,
        }
    }

    pub fn with_queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_replication_gate(mut self, gate: Arc<dyn ReplicationGate>) -> Self {
        self.replication = Some(gate);
        self
    }

    /// Begin a run: queue its first batch when `queue` is set, otherwise run
    /// every batch in-process until the run ends.
    pub async fn start(&self, state: RunState) -> Result<BatchOutcome> {
        if state.config.queue {
            let job_id = self.enqueue(&state).await?;
            return Ok(BatchOutcome::Queued { job_id, state });
        }
        self.run_to_completion(state).await
    }

    /// Run batches in-process until exhaustion, the batch cap or a queue hand-off.
    ///
    /// A category run also ends once none of its users can be notified.
    pub async fn run_to_completion(&self, mut state: RunState) -> Result<BatchOutcome> {
        loop {
            match self.run_batch(state).await? {
                BatchOutcome::RunNext(next) => state = next,
                outcome => return Ok(outcome),
            }
        }
    }

    /// Run one batch and schedule whatever follows it.
    #[instrument(skip(self, state), fields(subsystem = "jobs", component = "scheduler", op = "run_batch", job_number = state.job_number))]
    pub async fn run_batch(&self, state: RunState) -> Result<BatchOutcome> {
        let notifier = self.factory.create().map_err(|e| {
            error!(error = %e, "Cannot build notifier, check configuration");
            e
        })?;

        match notifier.run(state).await? {
            None => Ok(BatchOutcome::Exhausted),
            Some(next) => self.schedule_next(next).await,
        }
    }

    /// Decide on and prepare the batch after `state`.
    pub async fn schedule_next(&self, mut state: RunState) -> Result<BatchOutcome> {
        if state.users_exhausted {
            info!(
                job_number = state.job_number,
                last_page_id = state.last_page_id,
                "No listed user left to notify"
            );
            return Ok(BatchOutcome::UsersExhausted(state));
        }

        if state.reached_max_jobs() {
            info!(
                job_number = state.job_number,
                max_jobs = state.max_jobs,
                "Reached maximum number of jobs"
            );
            return Ok(BatchOutcome::MaxJobsReached(state));
        }

        info!(job_number = state.job_number + 1, "Queuing next batch");
        state.job_number += 1;

        if let Some(gate) = &self.replication {
            if let Err(e) = gate.wait_for_replication().await {
                return Err(Self::lost_batch(&state, "Replication wait failed", e));
            }
        }

        if state.config.queue {
            match self.enqueue(&state).await {
                Ok(job_id) => Ok(BatchOutcome::Queued { job_id, state }),
                Err(e) => Err(Self::lost_batch(&state, "Cannot queue next batch", e)),
            }
        } else {
            Ok(BatchOutcome::RunNext(state))
        }
    }

    /// Log where the run stopped so it can be resumed with `--start-after`.
    fn lost_batch(state: &RunState, reason: &str, e: Error) -> Error {
        error!(
            last_page_id = state.last_page_id,
            job_number = state.job_number,
            error = %e,
            "{}, run stopped",
            reason
        );
        Error::Job(format!(
            "{} (last_page_id={}, job_number={}): {}",
            reason, state.last_page_id, state.job_number, e
        ))
    }

    async fn enqueue(&self, state: &RunState) -> Result<Uuid> {
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| Error::Config("Queued run without a job queue".to_string()))?;
        let job_id = queue.push(state).await?;
        info!(%job_id, job_number = state.job_number, "Batch queued");
        Ok(job_id)
    }
}
