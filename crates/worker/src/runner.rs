//! The stage worker loop: pop one descriptor, run one attempt, settle the
//! outcome.
//!
//! Every settlement path writes the job record before it touches a queue,
//! so a reader of the store never sees a job further along in a queue than
//! its record admits.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use parallax_broker::{Broker, BrokerError};
use parallax_core::error::CoreError;
use parallax_core::job::{JobDescriptor, JobOutput, JobRecord};
use parallax_core::progress::ProgressEvent;
use parallax_core::stage::Stage;
use parallax_core::status::JobStatus;

use crate::processor::{StageFailure, StageOutput, StageProcessor};
use crate::reporter::ProgressReporter;
use crate::retry::RetryPolicy;

/// How long one dequeue blocks before the loop re-checks for shutdown.
pub const DEFAULT_DEQUEUE_TIMEOUT: Duration = Duration::from_secs(60);

/// Pause after an infrastructure failure before the loop polls again.
const FAILURE_PAUSE: Duration = Duration::from_secs(10);

/// An attempt that could not run to a settled outcome.
///
/// `Broker` means the queue or store was unreachable; the loop logs it and
/// backs off before polling again. `Record` means a store record refused a
/// transition the flow assumed was open.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error("Record transition refused: {0}")]
    Record(#[from] CoreError),
}

// ---------------------------------------------------------------------------
// Stage worker
// ---------------------------------------------------------------------------

/// A worker bound to one pipeline stage.
pub struct StageWorker {
    stage: Stage,
    broker: Arc<dyn Broker>,
    processor: Arc<dyn StageProcessor>,
    reporter: ProgressReporter,
    retry: RetryPolicy,
    dequeue_timeout: Duration,
    failure_pause: Duration,
}

impl StageWorker {
    pub fn new(
        stage: Stage,
        broker: Arc<dyn Broker>,
        processor: Arc<dyn StageProcessor>,
        reporter: ProgressReporter,
    ) -> Self {
        Self {
            stage,
            broker,
            processor,
            reporter,
            retry: RetryPolicy::default(),
            dequeue_timeout: DEFAULT_DEQUEUE_TIMEOUT,
            failure_pause: FAILURE_PAUSE,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = timeout;
        self
    }

    pub fn with_failure_pause(mut self, pause: Duration) -> Self {
        self.failure_pause = pause;
        self
    }

    /// Run until `cancel` fires.
    ///
    /// A descriptor in hand is always settled before the next iteration;
    /// cancellation is observed between attempts, never mid-attempt. A stage
    /// failure therefore terminates nothing: the loop's only exit is the
    /// cancellation token.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(stage = %self.stage, "Stage worker started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(stage = %self.stage, "Stage worker shutting down");
                    break;
                }
                popped = self.broker.dequeue(self.stage, self.dequeue_timeout) => {
                    let infra_trouble = match popped {
                        Ok(Some(descriptor)) => match self.run_attempt(descriptor).await {
                            Ok(()) => false,
                            Err(err) => {
                                tracing::error!(stage = %self.stage, error = %err, "Attempt aborted");
                                true
                            }
                        },
                        // Timed out empty; loop around for the shutdown check.
                        Ok(None) => false,
                        Err(err) => {
                            tracing::error!(stage = %self.stage, error = %err, "Dequeue failed");
                            true
                        }
                    };
                    if infra_trouble {
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            _ = tokio::time::sleep(self.failure_pause) => {}
                        }
                    }
                }
            }
        }
    }

    /// Run a single attempt for one popped descriptor.
    async fn run_attempt(&self, mut descriptor: JobDescriptor) -> Result<(), WorkerError> {
        tracing::info!(
            job_id = %descriptor.job_id,
            stage = %self.stage,
            attempt = descriptor.attempt(),
            max_retries = descriptor.max_retries,
            "Processing job"
        );

        let mut record = self.load_record(&descriptor).await?;
        if let Err(err) = record.begin_stage(self.stage) {
            // A settled job can still have a descriptor in flight (operator
            // replay, duplicate enqueue). Consume it without another write.
            tracing::warn!(
                job_id = %descriptor.job_id,
                error = %err,
                "Dropping descriptor for settled job"
            );
            return Ok(());
        }
        if descriptor.retries > 0 {
            record.retries.insert(self.stage, descriptor.retries);
        }
        self.broker.put(&record).await?;
        descriptor.status = JobStatus::Processing(self.stage);

        match self.processor.process(&descriptor, &self.reporter).await {
            Ok(output) => self.settle_success(descriptor, record, output).await,
            Err(failure) => self.settle_failure(descriptor, record, failure).await,
        }
    }

    async fn load_record(&self, descriptor: &JobDescriptor) -> Result<JobRecord, BrokerError> {
        if let Some(record) = self.broker.get(&descriptor.job_id).await? {
            return Ok(record);
        }
        // The store record is written before the first enqueue, so this only
        // happens after a store flush. Rebuild rather than stall the queue.
        tracing::warn!(
            job_id = %descriptor.job_id,
            "No record for descriptor, rebuilding from queue entry"
        );
        let mut record = JobRecord::new(
            descriptor.job_id.clone(),
            descriptor.payload.source_path.clone(),
        );
        record.created_at = descriptor.created_at;
        Ok(record)
    }

    async fn settle_success(
        &self,
        descriptor: JobDescriptor,
        mut record: JobRecord,
        output: StageOutput,
    ) -> Result<(), WorkerError> {
        let StageOutput { payload, artifact } = output;
        match descriptor.advance(payload.clone()) {
            Some(next) => {
                record.mark_queued()?;
                self.broker.put(&record).await?;
                self.broker.enqueue(next.stage, &next).await?;
                self.reporter
                    .report(ProgressEvent::now(
                        descriptor.job_id.clone(),
                        self.stage,
                        100,
                        format!("{} stage complete", self.stage),
                    ))
                    .await;
                tracing::info!(
                    job_id = %descriptor.job_id,
                    from = %self.stage,
                    to = %next.stage,
                    "Stage complete, job handed to next stage"
                );
            }
            None => {
                let artifact = artifact.unwrap_or_else(|| JobOutput {
                    path: payload
                        .output_path
                        .clone()
                        .unwrap_or_else(|| payload.source_path.clone()),
                    size_bytes: 0,
                });
                let file_name = artifact.path.rsplit('/').next().unwrap_or_default();
                let message = format!("Processing completed. File saved: {file_name}");
                record.complete(artifact)?;
                self.broker.put(&record).await?;
                self.reporter
                    .report(ProgressEvent::now(
                        descriptor.job_id.clone(),
                        self.stage,
                        100,
                        message,
                    ))
                    .await;
                tracing::info!(job_id = %descriptor.job_id, "Job completed");
            }
        }
        Ok(())
    }

    async fn settle_failure(
        &self,
        mut descriptor: JobDescriptor,
        mut record: JobRecord,
        failure: StageFailure,
    ) -> Result<(), WorkerError> {
        descriptor.record_failure();
        let message = failure.to_string();
        tracing::warn!(
            job_id = %descriptor.job_id,
            stage = %self.stage,
            failures = descriptor.retries,
            max_retries = descriptor.max_retries,
            error = %message,
            "Stage attempt failed"
        );

        if descriptor.exhausted() {
            record.fail(self.stage, descriptor.retries, message.as_str())?;
            self.broker.put(&record).await?;
            self.broker.deadletter(self.stage, &descriptor).await?;
            self.reporter
                .report(ProgressEvent::now(
                    descriptor.job_id.clone(),
                    self.stage,
                    0,
                    format!("{} processing failed: {message}", self.stage),
                ))
                .await;
            tracing::error!(
                job_id = %descriptor.job_id,
                stage = %self.stage,
                "Retry budget exhausted, job dead-lettered"
            );
        } else {
            record.mark_retry(self.stage, descriptor.retries, message.as_str())?;
            self.broker.put(&record).await?;
            let delay = self.retry.delay_for(descriptor.retries);
            tracing::info!(
                job_id = %descriptor.job_id,
                delay_ms = delay.as_millis() as u64,
                "Re-queueing failed attempt"
            );
            tokio::time::sleep(delay).await;
            self.broker.enqueue(self.stage, &descriptor).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
