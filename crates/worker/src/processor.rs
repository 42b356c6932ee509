//! The contract between the worker harness and stage-specific logic.

use async_trait::async_trait;

use parallax_core::job::{JobDescriptor, JobOutput, StagePayload};

use crate::reporter::ProgressReporter;

/// What a successful stage run produced.
///
/// `payload` is handed to the next stage verbatim (or recorded as the final
/// payload if this was the last stage). `artifact` is only meaningful on the
/// last stage; intermediate stages leave it `None`.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub payload: StagePayload,
    pub artifact: Option<JobOutput>,
}

/// A domain-level stage failure.
///
/// This is the error a processor returns when the stage itself went wrong
/// (bad input, runtime crash, non-zero exit). It counts against the job's
/// retry budget. Infrastructure trouble (broker unreachable) is *not* a
/// `StageFailure` and never consumes an attempt.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct StageFailure(pub String);

impl StageFailure {
    pub fn new(message: impl Into<String>) -> Self {
        StageFailure(message.into())
    }
}

/// Stage-specific processing logic.
///
/// Implementations run one attempt of one job. They may report intermediate
/// progress through the [`ProgressReporter`]; the harness reports the
/// terminal events itself.
#[async_trait]
pub trait StageProcessor: Send + Sync {
    async fn process(
        &self,
        descriptor: &JobDescriptor,
        reporter: &ProgressReporter,
    ) -> Result<StageOutput, StageFailure>;
}
