//! Job worker draining queued notification batches.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, Notify};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use imagesuggest_core::{defaults, JobQueue, QueuedBatch, Result};

use crate::handler::{JobContext, JobHandler, JobResult};

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds when the queue is empty.
    pub poll_interval_ms: u64,
    /// Whether to enable job processing.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::JOB_POLL_INTERVAL_MS,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `JOB_POLL_INTERVAL_MS` | `5000` | Polling interval when queue is empty |
    pub fn from_env() -> Self {
        let enabled = std::env::var("JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let poll_interval_ms = std::env::var("JOB_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_POLL_INTERVAL_MS);

        Self {
            poll_interval_ms,
            enabled,
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the job worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// A batch was claimed and started.
    JobStarted { job_id: Uuid, job_number: u32 },
    /// A batch completed successfully.
    JobCompleted { job_id: Uuid, job_number: u32 },
    /// A batch failed.
    JobFailed { job_id: Uuid, job_number: u32, error: String },
    /// Worker started.
    WorkerStarted,
    /// Worker stopped.
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx.send(()).await.map_err(|_| {
            imagesuggest_core::Error::Internal("Failed to send shutdown signal".into())
        })?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Worker that claims queued batches one at a time and runs them.
pub struct JobWorker {
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
    wake: Option<Arc<Notify>>,
}

impl JobWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        config: WorkerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            queue,
            handler,
            config,
            event_tx,
            wake: None,
        }
    }

    /// Wake the idle worker whenever this handle is notified.
    pub fn with_wake(mut self, wake: Arc<Notify>) -> Self {
        self.wake = Some(wake);
        self
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Process queued batches until the queue is empty.
    ///
    /// Returns the number of batches processed. A handler may queue a
    /// successor, which is then processed in the same call.
    pub async fn run_until_idle(&self) -> Result<usize> {
        let mut processed = 0;
        while let Some(batch) = self.queue.claim_next().await? {
            self.execute_job(batch).await;
            processed += 1;
        }
        Ok(processed)
    }

    /// Claim and run a single batch, if one is pending.
    pub async fn process_next(&self) -> Result<bool> {
        match self.queue.claim_next().await? {
            Some(batch) => {
                self.execute_job(batch).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "worker"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Job worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            job_type = self.handler.job_type(),
            "Job worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let wake = self.wake.clone().unwrap_or_else(|| Arc::new(Notify::new()));

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Job worker received shutdown signal");
                break;
            }

            let claimed = match self.process_next().await {
                Ok(claimed) => claimed,
                Err(e) => {
                    error!(error = %e, "Failed to claim job");
                    false
                }
            };

            if !claimed {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Job worker received shutdown signal");
                        break;
                    }
                    _ = wake.notified() => {
                        debug!("Job worker woken by new batch");
                    }
                    _ = sleep(poll_interval) => {}
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Job worker stopped");
    }

    async fn execute_job(&self, batch: QueuedBatch) {
        let start = Instant::now();
        let job_id = batch.id;
        let job_number = batch.state.job_number;

        info!(%job_id, job_number, "Processing batch");
        let _ = self.event_tx.send(WorkerEvent::JobStarted { job_id, job_number });

        match self.handler.execute(JobContext::new(batch)).await {
            JobResult::Success(summary) => {
                if let Err(e) = self.queue.complete(job_id).await {
                    error!(error = %e, %job_id, "Failed to mark job as completed");
                    return;
                }
                info!(
                    %job_id,
                    job_number,
                    num_notifications = summary.map(|s| s.num_notifications),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Batch completed"
                );
                let _ = self
                    .event_tx
                    .send(WorkerEvent::JobCompleted { job_id, job_number });
            }
            JobResult::Failed(error) => {
                if let Err(e) = self.queue.fail(job_id, &error).await {
                    error!(error = %e, %job_id, "Failed to mark job as failed");
                    return;
                }
                warn!(
                    %job_id,
                    job_number,
                    %error,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Batch failed"
                );
                let _ = self.event_tx.send(WorkerEvent::JobFailed {
                    job_id,
                    job_number,
                    error,
                });
            }
        }
    }
}
