//! In-process broker for tests and single-process runs.
//!
//! Queues and the record store keep the same serialized-blob representation
//! the Redis backend uses, so codec behavior is identical across backends.
//! Progress fan-out rides a `tokio::sync::broadcast` channel; every
//! subscriber gets its own copy of each event and lagging subscribers drop
//! the oldest events rather than blocking publishers.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex, Notify};

use parallax_core::job::{JobDescriptor, JobRecord};
use parallax_core::keys;
use parallax_core::progress::ProgressEvent;
use parallax_core::stage::Stage;
use parallax_core::types::JobId;

use crate::codec;
use crate::contract::{Broker, BoxStream, JobQueue, JobStore, ProgressChannel};
use crate::error::BrokerError;

/// Buffered events per subscriber before the oldest are dropped.
const PROGRESS_CHANNEL_CAPACITY: usize = 1024;

pub struct MemoryBroker {
    /// Stage queues and dead-letter lists, keyed by their wire names.
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    /// Job records, keyed by their store keys.
    records: Mutex<HashMap<String, String>>,
    /// One wakeup per queue key for blocking dequeues.
    wakeups: Mutex<HashMap<String, Arc<Notify>>>,
    events: broadcast::Sender<ProgressEvent>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self {
            lists: Mutex::new(HashMap::new()),
            records: Mutex::new(HashMap::new()),
            wakeups: Mutex::new(HashMap::new()),
            events,
        }
    }

    async fn wakeup(&self, key: &str) -> Arc<Notify> {
        self.wakeups
            .lock()
            .await
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    async fn push(&self, key: String, blob: String) {
        self.lists
            .lock()
            .await
            .entry(key.clone())
            .or_default()
            .push_back(blob);
        self.wakeup(&key).await.notify_one();
    }

    async fn snapshot(&self, key: &str) -> Result<Vec<JobDescriptor>, BrokerError> {
        let lists = self.lists.lock().await;
        let Some(list) = lists.get(key) else {
            return Ok(Vec::new());
        };
        list.iter().map(|blob| codec::decode(blob)).collect()
    }

    /// Descriptors currently waiting in a stage queue, head first.
    pub async fn queued(&self, stage: Stage) -> Result<Vec<JobDescriptor>, BrokerError> {
        self.snapshot(&keys::stage_queue(stage)).await
    }

    /// Descriptors parked in a stage's dead-letter list, oldest first.
    pub async fn deadletters(&self, stage: Stage) -> Result<Vec<JobDescriptor>, BrokerError> {
        self.snapshot(&keys::stage_deadletter(stage)).await
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for MemoryBroker {
    async fn enqueue(&self, stage: Stage, descriptor: &JobDescriptor) -> Result<(), BrokerError> {
        let blob = codec::encode(descriptor)?;
        self.push(keys::stage_queue(stage), blob).await;
        Ok(())
    }

    async fn dequeue(
        &self,
        stage: Stage,
        timeout: Duration,
    ) -> Result<Option<JobDescriptor>, BrokerError> {
        let key = keys::stage_queue(stage);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notify = self.wakeup(&key).await;
            // Register interest before the pop attempt so a push landing
            // between the check and the wait still wakes this caller.
            let notified = notify.notified();

            let popped = self
                .lists
                .lock()
                .await
                .get_mut(&key)
                .and_then(VecDeque::pop_front);
            if let Some(blob) = popped {
                return Ok(Some(codec::decode(&blob)?));
            }

            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
            // Woken: loop and race other dequeuers for the new entry.
        }
    }

    async fn deadletter(
        &self,
        stage: Stage,
        descriptor: &JobDescriptor,
    ) -> Result<(), BrokerError> {
        let blob = codec::encode(descriptor)?;
        self.push(keys::stage_deadletter(stage), blob).await;
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryBroker {
    async fn put(&self, record: &JobRecord) -> Result<(), BrokerError> {
        let blob = codec::encode(record)?;
        self.records
            .lock()
            .await
            .insert(keys::job_record(&record.job_id), blob);
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> Result<Option<JobRecord>, BrokerError> {
        let records = self.records.lock().await;
        match records.get(&keys::job_record(job_id)) {
            Some(blob) => Ok(Some(codec::decode(blob)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ProgressChannel for MemoryBroker {
    async fn publish(&self, event: &ProgressEvent) -> Result<(), BrokerError> {
        // SendError only means nobody is subscribed right now.
        let _ = self.events.send(event.clone());
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<BoxStream<ProgressEvent>, BrokerError> {
        let rx = self.events.subscribe();
        let pattern = pattern.to_string();
        let stream = futures::stream::unfold(rx, move |mut rx| {
            let pattern = pattern.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(event) if wildcard_match(&pattern, event.job_id.as_str()) => {
                            return Some((event, rx));
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Progress subscriber lagging; events dropped");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn ping(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// Match `input` against a pattern where `*` spans any run of characters.
fn wildcard_match(pattern: &str, input: &str) -> bool {
    let Some((prefix, rest)) = pattern.split_once('*') else {
        return pattern == input;
    };
    let Some(mut remainder) = input.strip_prefix(prefix) else {
        return false;
    };
    let mut middle: Vec<&str> = rest.split('*').collect();
    let suffix = middle.pop().unwrap_or("");
    for part in middle {
        if part.is_empty() {
            continue;
        }
        match remainder.find(part) {
            Some(at) => remainder = &remainder[at + part.len()..],
            None => return false,
        }
    }
    remainder.ends_with(suffix)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use parallax_core::status::JobStatus;

    use super::*;

    fn descriptor(id: &str) -> JobDescriptor {
        JobDescriptor::first_stage(JobId::from(id), format!("/uploads/{id}.mp4"), 3)
    }

    fn event(id: &str, progress: u8) -> ProgressEvent {
        ProgressEvent::now(JobId::from(id), Stage::Reconstruct, progress, "working")
    }

    // -- queue ----------------------------------------------------------------

    #[tokio::test]
    async fn dequeue_preserves_fifo_order() {
        let broker = MemoryBroker::new();
        broker.enqueue(Stage::Reconstruct, &descriptor("a")).await.unwrap();
        broker.enqueue(Stage::Reconstruct, &descriptor("b")).await.unwrap();

        let first = broker
            .dequeue(Stage::Reconstruct, Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        let second = broker
            .dequeue(Stage::Reconstruct, Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.job_id, JobId::from("a"));
        assert_eq!(second.job_id, JobId::from("b"));
    }

    #[tokio::test]
    async fn empty_queue_times_out_without_error() {
        let broker = MemoryBroker::new();
        let popped = broker
            .dequeue(Stage::Import, Duration::from_millis(20))
            .await
            .unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn queues_are_stage_scoped() {
        let broker = MemoryBroker::new();
        broker.enqueue(Stage::Reconstruct, &descriptor("a")).await.unwrap();
        let popped = broker
            .dequeue(Stage::Import, Duration::ZERO)
            .await
            .unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn blocked_dequeue_wakes_on_enqueue() {
        let broker = Arc::new(MemoryBroker::new());
        let waiter = {
            let broker = broker.clone();
            tokio::spawn(async move {
                broker
                    .dequeue(Stage::Reconstruct, Duration::from_secs(5))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        broker.enqueue(Stage::Reconstruct, &descriptor("a")).await.unwrap();

        let popped = waiter.await.unwrap().unwrap();
        assert_eq!(popped.unwrap().job_id, JobId::from("a"));
    }

    #[tokio::test]
    async fn concurrent_dequeuers_never_share_a_descriptor() {
        let broker = Arc::new(MemoryBroker::new());
        for i in 0..20 {
            broker
                .enqueue(Stage::Reconstruct, &descriptor(&format!("job-{i}")))
                .await
                .unwrap();
        }

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let broker = broker.clone();
            consumers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(d) = broker
                    .dequeue(Stage::Reconstruct, Duration::from_millis(50))
                    .await
                    .unwrap()
                {
                    seen.push(d.job_id);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        all.sort();
        let before_dedup = all.len();
        all.dedup();
        assert_eq!(before_dedup, all.len(), "a descriptor was delivered twice");
        assert_eq!(all.len(), 20);
    }

    #[tokio::test]
    async fn deadletter_is_separate_from_the_live_queue() {
        let broker = MemoryBroker::new();
        let mut d = descriptor("doomed");
        d.record_failure();
        d.record_failure();
        d.record_failure();
        broker.deadletter(Stage::Reconstruct, &d).await.unwrap();

        assert!(broker
            .dequeue(Stage::Reconstruct, Duration::ZERO)
            .await
            .unwrap()
            .is_none());
        let parked = broker.deadletters(Stage::Reconstruct).await.unwrap();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].job_id, JobId::from("doomed"));
        assert_eq!(parked[0].retries, 3);
    }

    // -- store ----------------------------------------------------------------

    #[tokio::test]
    async fn get_unknown_job_is_none() {
        let broker = MemoryBroker::new();
        assert!(broker.get(&JobId::from("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_overwrites_previous_record() {
        let broker = MemoryBroker::new();
        let mut record = JobRecord::new(JobId::from("j"), "/uploads/j.mp4");
        broker.put(&record).await.unwrap();

        record.begin_stage(Stage::Reconstruct).unwrap();
        broker.put(&record).await.unwrap();

        let stored = broker.get(&JobId::from("j")).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Processing(Stage::Reconstruct));
    }

    // -- progress channel -----------------------------------------------------

    #[tokio::test]
    async fn events_before_subscribe_are_lost() {
        let broker = MemoryBroker::new();
        broker.publish(&event("j", 10)).await.unwrap();

        let mut stream = broker.subscribe("*").await.unwrap();
        broker.publish(&event("j", 20)).await.unwrap();

        let received = tokio::time::timeout(Duration::from_millis(200), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.progress, 20);

        let silence = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(silence.is_err(), "only the post-subscribe event arrives");
    }

    #[tokio::test]
    async fn every_subscriber_receives_its_own_copy() {
        let broker = MemoryBroker::new();
        let mut first = broker.subscribe("*").await.unwrap();
        let mut second = broker.subscribe("*").await.unwrap();

        broker.publish(&event("j", 42)).await.unwrap();

        let a = tokio::time::timeout(Duration::from_millis(200), first.next())
            .await
            .unwrap()
            .unwrap();
        let b = tokio::time::timeout(Duration::from_millis(200), second.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn subscribe_filters_by_job_id_pattern() {
        let broker = MemoryBroker::new();
        let mut stream = broker.subscribe("batch-a-*").await.unwrap();

        broker.publish(&event("batch-b-1", 5)).await.unwrap();
        broker.publish(&event("batch-a-7", 9)).await.unwrap();

        let received = tokio::time::timeout(Duration::from_millis(200), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.job_id, JobId::from("batch-a-7"));
    }

    // -- wildcard matching ----------------------------------------------------

    #[test]
    fn wildcard_star_matches_everything() {
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("*", "anything"));
    }

    #[test]
    fn wildcard_literal_requires_equality() {
        assert!(wildcard_match("j-1", "j-1"));
        assert!(!wildcard_match("j-1", "j-12"));
    }

    #[test]
    fn wildcard_prefix_suffix_and_middle() {
        assert!(wildcard_match("j-*", "j-42"));
        assert!(!wildcard_match("j-*", "k-42"));
        assert!(wildcard_match("*-42", "j-42"));
        assert!(wildcard_match("j-*-final", "j-42-final"));
        assert!(!wildcard_match("j-*-final", "j-42-draft"));
    }
}
