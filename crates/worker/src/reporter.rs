//! Best-effort progress reporting.
//!
//! Every event goes out on the broker's progress channel; optionally it is
//! also pushed over HTTP to the broadcast service's `/progress` ingress, for
//! deployments where the runtime sits behind a network boundary the pub/sub
//! bus does not cross. Reporting never fails the attempt: a job must not
//! burn a retry because a progress message was lost.

use std::sync::Arc;
use std::time::Duration;

use parallax_broker::Broker;
use parallax_core::progress::ProgressEvent;

/// Timeout for a single HTTP push.
const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

struct PushTarget {
    client: reqwest::Client,
    url: String,
}

/// Publishes progress events on behalf of a stage processor.
pub struct ProgressReporter {
    broker: Arc<dyn Broker>,
    push: Option<PushTarget>,
}

impl ProgressReporter {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        ProgressReporter { broker, push: None }
    }

    /// Additionally push every event to `url`.
    pub fn with_push(mut self, url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(PUSH_TIMEOUT)
            .build()
            .expect("Failed to build progress push HTTP client");
        self.push = Some(PushTarget {
            client,
            url: url.into(),
        });
        self
    }

    /// Publish `event` everywhere it is wanted, logging failures instead of
    /// returning them.
    pub async fn report(&self, event: ProgressEvent) {
        if let Err(err) = self.broker.publish(&event).await {
            tracing::warn!(
                job_id = %event.job_id,
                error = %err,
                "Failed to publish progress event"
            );
        }

        if let Some(push) = &self.push {
            let sent = push
                .client
                .post(&push.url)
                .json(&event)
                .send()
                .await
                .and_then(|response| response.error_for_status());
            if let Err(err) = sent {
                tracing::warn!(
                    job_id = %event.job_id,
                    url = %push.url,
                    error = %err,
                    "Failed to push progress event"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use parallax_broker::{MemoryBroker, ProgressChannel};
    use parallax_core::stage::Stage;
    use parallax_core::types::JobId;

    use super::*;

    #[tokio::test]
    async fn report_publishes_on_the_progress_channel() {
        let broker = Arc::new(MemoryBroker::new());
        let mut events = broker.subscribe("*").await.unwrap();
        let reporter = ProgressReporter::new(broker.clone());

        let job_id = JobId::new();
        reporter
            .report(ProgressEvent::now(
                job_id.clone(),
                Stage::Reconstruct,
                40,
                "Matching features",
            ))
            .await;

        let received = events.next().await.unwrap();
        assert_eq!(received.job_id, job_id);
        assert_eq!(received.progress, 40);
        assert_eq!(received.stage, Stage::Reconstruct);
    }

    #[tokio::test]
    async fn report_survives_an_unreachable_push_target() {
        let broker = Arc::new(MemoryBroker::new());
        let reporter =
            ProgressReporter::new(broker).with_push("http://127.0.0.1:9/progress");

        // Nothing listens on the discard port; report must still return.
        reporter
            .report(ProgressEvent::now(
                JobId::new(),
                Stage::Reconstruct,
                10,
                "Starting",
            ))
            .await;
    }
}
