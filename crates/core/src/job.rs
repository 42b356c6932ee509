//! Job records and queue descriptors.
//!
//! The record in the job store is the queryable truth about a job; the
//! descriptor is the unit that travels through stage queues and carries the
//! authoritative retry counter for its stage. The record's `retries` map is
//! telemetry reconciled from descriptors, never read back for control flow.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::stage::Stage;
use crate::status::JobStatus;
use crate::types::{JobId, Timestamp};

/// Retry budget per stage when none is configured.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// Job record (store side)
// ---------------------------------------------------------------------------

/// Artifact produced by a successfully completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutput {
    pub path: String,
    pub size_bytes: u64,
}

/// The job store record: the queryable source of truth for job state.
///
/// Written by the gateway at ingestion and by exactly one worker at a time
/// afterwards. Exclusivity comes from the queue's atomic pop, not from store
/// locking; the store itself is last-writer-wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub status: JobStatus,
    pub source_path: String,
    /// Failed attempts per stage, mirrored from descriptors for operators.
    #[serde(default)]
    pub retries: BTreeMap<Stage, u32>,
    pub created_at: Timestamp,
    /// When the most recent stage attempt began. Staleness of this field is
    /// the hook an external supervisor uses to spot jobs lost to a worker
    /// crash mid-attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_started_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<Timestamp>,
    /// Last failure message. Set on failure, never cleared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JobOutput>,
}

impl JobRecord {
    /// Initial record written by the gateway before the first enqueue.
    pub fn new(job_id: JobId, source_path: impl Into<String>) -> Self {
        Self {
            job_id,
            status: JobStatus::Queued,
            source_path: source_path.into(),
            retries: BTreeMap::new(),
            created_at: Utc::now(),
            stage_started_at: None,
            completed_at: None,
            failed_at: None,
            error: None,
            output: None,
        }
    }

    /// Mark the record as being worked on by the given stage.
    pub fn begin_stage(&mut self, stage: Stage) -> Result<(), CoreError> {
        self.ensure_live()?;
        self.status = JobStatus::Processing(stage);
        self.stage_started_at = Some(Utc::now());
        Ok(())
    }

    /// Record a failed attempt that stays within the retry budget.
    pub fn mark_retry(
        &mut self,
        stage: Stage,
        failures: u32,
        error: impl Into<String>,
    ) -> Result<(), CoreError> {
        self.ensure_live()?;
        self.status = JobStatus::Retry(stage);
        self.retries.insert(stage, failures);
        self.error = Some(error.into());
        Ok(())
    }

    /// Hand the job back to a queue for its next stage.
    pub fn mark_queued(&mut self) -> Result<(), CoreError> {
        self.ensure_live()?;
        self.status = JobStatus::Queued;
        Ok(())
    }

    /// Terminal success.
    pub fn complete(&mut self, output: JobOutput) -> Result<(), CoreError> {
        self.ensure_live()?;
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.output = Some(output);
        Ok(())
    }

    /// Terminal failure once the retry budget is exhausted.
    pub fn fail(
        &mut self,
        stage: Stage,
        failures: u32,
        error: impl Into<String>,
    ) -> Result<(), CoreError> {
        self.ensure_live()?;
        self.status = JobStatus::Failed(stage);
        self.retries.insert(stage, failures);
        self.failed_at = Some(Utc::now());
        self.error = Some(error.into());
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "Job {} is already {}",
                self.job_id, self.status
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Job descriptor (queue side)
// ---------------------------------------------------------------------------

/// Stage-specific payload paths carried by a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePayload {
    /// Original footage the job was ingested with.
    pub source_path: String,
    /// Reconstructed scene, produced by the reconstruct stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_path: Option<String>,
    /// Where the import stage writes the packaged artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

impl StagePayload {
    pub fn from_source(source_path: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            scene_path: None,
            output_path: None,
        }
    }
}

/// The serialized unit that travels through a stage queue.
///
/// A descriptor exists in exactly one place at a time: a stage queue, the
/// hands of the worker that popped it, or a dead-letter list. Its `retries`
/// field is the single source of truth for attempt accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job_id: JobId,
    pub stage: Stage,
    pub payload: StagePayload,
    pub status: JobStatus,
    pub created_at: Timestamp,
    /// Failed attempts at this stage so far.
    pub retries: u32,
    pub max_retries: u32,
}

impl JobDescriptor {
    /// Descriptor for a freshly ingested job entering the first stage.
    pub fn first_stage(
        job_id: JobId,
        source_path: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            job_id,
            stage: Stage::first(),
            payload: StagePayload::from_source(source_path),
            status: JobStatus::Queued,
            created_at: Utc::now(),
            retries: 0,
            max_retries,
        }
    }

    /// Account for one failed attempt.
    ///
    /// Increments the failure counter and flips the status; `exhausted()`
    /// afterwards decides between re-enqueue and dead-letter. A descriptor
    /// dead-letters on its `max_retries`-th failure carrying
    /// `retries == max_retries`.
    pub fn record_failure(&mut self) {
        self.retries += 1;
        self.status = if self.exhausted() {
            JobStatus::Failed(self.stage)
        } else {
            JobStatus::Retry(self.stage)
        };
    }

    /// Whether the retry budget for this stage is used up.
    pub fn exhausted(&self) -> bool {
        self.retries >= self.max_retries
    }

    /// Descriptor for the next pipeline stage, or `None` after the last.
    ///
    /// The successor starts with a fresh retry counter; `payload` carries
    /// whatever paths the finished stage produced.
    pub fn advance(&self, payload: StagePayload) -> Option<JobDescriptor> {
        let next = self.stage.successor()?;
        Some(JobDescriptor {
            job_id: self.job_id.clone(),
            stage: next,
            payload,
            status: JobStatus::Queued,
            created_at: self.created_at,
            retries: 0,
            max_retries: self.max_retries,
        })
    }

    /// Attempt number for logging (first attempt is 1).
    pub fn attempt(&self) -> u32 {
        self.retries + 1
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
