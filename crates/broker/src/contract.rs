//! Contracts every broker backend honors.
//!
//! The three traits are the only shared-state surface in the pipeline:
//! correctness relies on the queue's atomic pop, not on store locking.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;

use parallax_core::job::{JobDescriptor, JobRecord};
use parallax_core::progress::ProgressEvent;
use parallax_core::stage::Stage;
use parallax_core::types::JobId;

use crate::error::BrokerError;

/// Boxed stream alias (stable-Rust friendly).
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Durable FIFO queues, one per stage, plus a dead-letter list per stage.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append to the tail of the stage's queue. Never blocks.
    async fn enqueue(&self, stage: Stage, descriptor: &JobDescriptor) -> Result<(), BrokerError>;

    /// Atomically pop one descriptor from the head, waiting up to `timeout`.
    ///
    /// `Ok(None)` means the queue stayed empty for the whole window; callers
    /// treat it as a liveness poll, not an error. No two concurrent callers
    /// receive the same descriptor.
    ///
    /// Popping is not transactional: the descriptor leaves the queue before
    /// processing completes. A worker crash mid-attempt loses the queue
    /// entry; the job then survives only as its last-written store record.
    async fn dequeue(
        &self,
        stage: Stage,
        timeout: Duration,
    ) -> Result<Option<JobDescriptor>, BrokerError>;

    /// Append to the stage's dead-letter list. Entries are never
    /// auto-retried.
    async fn deadletter(&self, stage: Stage, descriptor: &JobDescriptor)
        -> Result<(), BrokerError>;
}

/// Shared job-record store.
///
/// Last-writer-wins, no compare-and-swap. A component may read-modify-write
/// only records it currently owns through the queue's exclusivity guarantee.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Idempotent overwrite keyed by the record's job id.
    async fn put(&self, record: &JobRecord) -> Result<(), BrokerError>;

    /// Current record, or `None` for an unknown id.
    async fn get(&self, job_id: &JobId) -> Result<Option<JobRecord>, BrokerError>;
}

/// Transient pub/sub for progress events.
#[async_trait]
pub trait ProgressChannel: Send + Sync {
    /// Fire-and-forget publish. Events published while nobody is subscribed
    /// are lost; progress is a live stream, not a log.
    async fn publish(&self, event: &ProgressEvent) -> Result<(), BrokerError>;

    /// Infinite stream of events whose job id matches a `*`-wildcard
    /// pattern. Every subscriber receives its own full copy of each matching
    /// event; there is no work-sharing between subscribers.
    async fn subscribe(&self, pattern: &str) -> Result<BoxStream<ProgressEvent>, BrokerError>;
}

/// The full broker surface plus liveness probing for health endpoints.
#[async_trait]
pub trait Broker: JobQueue + JobStore + ProgressChannel {
    /// Round-trip liveness check against the backend.
    async fn ping(&self) -> Result<(), BrokerError>;
}
