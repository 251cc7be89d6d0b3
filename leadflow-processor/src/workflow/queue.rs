//! Processing queue manager
//!
//! Decouples the rate of incoming bus events from the rate of pipeline
//! execution. A fixed-size worker pool pops jobs from a shared channel
//! and runs them through the pipeline; fatal pipeline failures are
//! retried with exponential backoff up to an attempt limit, then moved
//! to the dead-letter log (never silently dropped). Duplicate enqueues
//! for one lead are allowed; the pipeline's idempotent upsert makes
//! reprocessing safe.

use crate::types::{Lead, ProcessingStatus};
use crate::workflow::pipeline::ProcessingPipeline;
use chrono::{DateTime, Utc};
use leadflow_common::events::{subjects, BusClient, LeadProcessedEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const QUEUE_CAPACITY: usize = 1024;

/// Queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Concurrent pipeline workers
    pub workers: usize,
    /// Attempts before a job is dead-lettered
    pub max_attempts: u32,
    /// Base retry backoff; doubles per attempt
    pub backoff: Duration,
    /// Grace period for in-flight jobs on close
    pub shutdown_grace: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 3,
            backoff: Duration::from_millis(500),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// Queue-internal job wrapper; owned exclusively by the queue
#[derive(Debug, Clone)]
pub struct ProcessingJob {
    pub lead_id: String,
    pub payload: Lead,
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// A job that exhausted its retries, kept for operator inspection
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub lead_id: String,
    pub attempts: u32,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Job queue with a bounded worker pool
pub struct QueueManager {
    tx: mpsc::Sender<ProcessingJob>,
    rx: Arc<Mutex<mpsc::Receiver<ProcessingJob>>>,
    config: QueueConfig,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    dead_letters: Arc<RwLock<Vec<DeadLetter>>>,
}

impl QueueManager {
    pub fn new(config: QueueConfig) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            config,
            cancel: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
            dead_letters: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Enqueue a lead for processing
    ///
    /// Duplicate enqueues for the same lead are accepted and processed
    /// independently.
    pub async fn enqueue(&self, lead: Lead) -> bool {
        let job = ProcessingJob {
            lead_id: lead.id.clone(),
            payload: lead,
            attempt: 1,
            enqueued_at: Utc::now(),
        };

        match self.tx.send(job).await {
            Ok(()) => true,
            Err(e) => {
                warn!(lead_id = %e.0.lead_id, "Queue closed, job rejected");
                false
            }
        }
    }

    /// Start the worker pool
    pub async fn start_processing(
        &self,
        pipeline: Arc<ProcessingPipeline>,
        bus: Option<BusClient>,
    ) {
        let mut workers = self.workers.lock().await;
        for worker_id in 0..self.config.workers {
            workers.push(tokio::spawn(worker_loop(
                worker_id,
                self.rx.clone(),
                self.tx.clone(),
                pipeline.clone(),
                bus.clone(),
                self.config.clone(),
                self.cancel.clone(),
                self.dead_letters.clone(),
            )));
        }

        info!(workers = self.config.workers, "Processing queue started");
    }

    /// Dead-lettered jobs, newest last
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.read().await.clone()
    }

    /// Stop intake and drain in-flight jobs
    ///
    /// Workers finish their current job within the grace period; after
    /// that remaining workers are aborted.
    pub async fn close(&self) {
        self.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock().await);
        if handles.is_empty() {
            return;
        }

        let abort_handles: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let drain = futures::future::join_all(handles);

        if tokio::time::timeout(self.config.shutdown_grace, drain)
            .await
            .is_err()
        {
            warn!(
                grace_secs = self.config.shutdown_grace.as_secs(),
                "Shutdown grace period expired, aborting workers"
            );
            for handle in abort_handles {
                handle.abort();
            }
        }

        info!("Processing queue stopped");
    }
}

/// One worker: pop jobs, run the pipeline, apply the retry policy
#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<ProcessingJob>>>,
    tx: mpsc::Sender<ProcessingJob>,
    pipeline: Arc<ProcessingPipeline>,
    bus: Option<BusClient>,
    config: QueueConfig,
    cancel: CancellationToken,
    dead_letters: Arc<RwLock<Vec<DeadLetter>>>,
) {
    debug!(worker_id, "Queue worker started");

    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = async { rx.lock().await.recv().await } => {
                match job {
                    Some(job) => job,
                    None => break,
                }
            }
        };

        match pipeline.process(&job.payload).await {
            Ok(enriched) => {
                debug!(worker_id, lead_id = %job.lead_id, attempt = job.attempt, "Job completed");

                if let Some(bus) = &bus {
                    let event = LeadProcessedEvent {
                        lead_id: enriched.lead.id.clone(),
                        processing_status: match enriched.processing_status {
                            ProcessingStatus::Qualified => "qualified".to_string(),
                            ProcessingStatus::Failed => "failed".to_string(),
                        },
                        quality_score: enriched.classification.quality_score,
                        processed_at: enriched.processed_at,
                    };
                    if let Err(e) = bus.publish(subjects::LEAD_PROCESSED, &event).await {
                        warn!(lead_id = %job.lead_id, error = %e, "Failed to publish processed event");
                    }
                }
            }
            Err(e) => {
                if job.attempt < config.max_attempts {
                    // Exponential backoff, scheduled off-worker so this
                    // worker can pick up other jobs meanwhile
                    let backoff = config.backoff * 2_u32.saturating_pow(job.attempt - 1);
                    warn!(
                        lead_id = %job.lead_id,
                        attempt = job.attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Job failed, scheduling retry"
                    );

                    let retry = ProcessingJob {
                        attempt: job.attempt + 1,
                        ..job
                    };
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(backoff).await;
                        if tx.send(retry).await.is_err() {
                            debug!("Queue closed before retry could be enqueued");
                        }
                    });
                } else {
                    error!(
                        lead_id = %job.lead_id,
                        attempts = job.attempt,
                        error = %e,
                        "Job exhausted retries, moving to dead-letter log"
                    );
                    dead_letters.write().await.push(DeadLetter {
                        lead_id: job.lead_id,
                        attempts: job.attempt,
                        reason: e.to_string(),
                        failed_at: Utc::now(),
                    });
                }
            }
        }
    }

    debug!(worker_id, "Queue worker stopped");
}

// ============================================================================
// Tests
// ============================================================================
