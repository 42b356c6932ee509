//! Redis-backed broker: the production backend.
//!
//! Layout on the wire matches the deployed pipeline: stage queues are lists
//! written with `LPUSH` and drained with `BRPOP`, records live under
//! `job:{id}` string keys, and progress events ride `progress:{id}` pub/sub
//! topics consumed through `PSUBSCRIBE`.

use std::time::Duration;

use ::redis::aio::{ConnectionManager, MultiplexedConnection};
use ::redis::{AsyncCommands, Client};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Mutex;

use parallax_core::job::{JobDescriptor, JobRecord};
use parallax_core::keys;
use parallax_core::progress::ProgressEvent;
use parallax_core::stage::Stage;
use parallax_core::types::JobId;

use crate::codec;
use crate::contract::{Broker, BoxStream, JobQueue, JobStore, ProgressChannel};
use crate::error::BrokerError;

pub struct RedisBroker {
    client: Client,
    /// Auto-reconnecting connection for non-blocking commands.
    manager: ConnectionManager,
    /// Dedicated connection for `BRPOP`: a blocking command would stall
    /// everything multiplexed alongside it. One blocking consumer per broker
    /// handle; concurrent dequeues on the same handle serialize here.
    blocking: Mutex<MultiplexedConnection>,
}

impl RedisBroker {
    /// Connect to the Redis instance at `url` (e.g. `redis://127.0.0.1/`).
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client.clone()).await?;
        let blocking = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            client,
            manager,
            blocking: Mutex::new(blocking),
        })
    }
}

#[async_trait]
impl JobQueue for RedisBroker {
    async fn enqueue(&self, stage: Stage, descriptor: &JobDescriptor) -> Result<(), BrokerError> {
        let blob = codec::encode(descriptor)?;
        let mut con = self.manager.clone();
        let _: i64 = con.lpush(keys::stage_queue(stage), blob).await?;
        Ok(())
    }

    async fn dequeue(
        &self,
        stage: Stage,
        timeout: Duration,
    ) -> Result<Option<JobDescriptor>, BrokerError> {
        let key = keys::stage_queue(stage);
        let popped: Option<String> = if timeout.is_zero() {
            // BRPOP with a zero timeout blocks forever in Redis; a zero
            // timeout here means a non-blocking poll.
            let mut con = self.manager.clone();
            con.rpop(&key, None).await?
        } else {
            let mut con = self.blocking.lock().await;
            let reply: Option<(String, String)> = con.brpop(&key, timeout.as_secs_f64()).await?;
            reply.map(|(_, blob)| blob)
        };
        match popped {
            Some(blob) => Ok(Some(codec::decode(&blob)?)),
            None => Ok(None),
        }
    }

    async fn deadletter(
        &self,
        stage: Stage,
        descriptor: &JobDescriptor,
    ) -> Result<(), BrokerError> {
        let blob = codec::encode(descriptor)?;
        let mut con = self.manager.clone();
        let _: i64 = con.lpush(keys::stage_deadletter(stage), blob).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for RedisBroker {
    async fn put(&self, record: &JobRecord) -> Result<(), BrokerError> {
        let blob = codec::encode(record)?;
        let mut con = self.manager.clone();
        let _: () = con.set(keys::job_record(&record.job_id), blob).await?;
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> Result<Option<JobRecord>, BrokerError> {
        let mut con = self.manager.clone();
        let blob: Option<String> = con.get(keys::job_record(job_id)).await?;
        match blob {
            Some(blob) => Ok(Some(codec::decode(&blob)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ProgressChannel for RedisBroker {
    async fn publish(&self, event: &ProgressEvent) -> Result<(), BrokerError> {
        let blob = codec::encode(event)?;
        let mut con = self.manager.clone();
        // The receiver count is irrelevant: zero subscribers is a successful
        // publish, only an unreachable backend is an error.
        let _: i64 = con.publish(keys::progress_topic(&event.job_id), blob).await?;
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<BoxStream<ProgressEvent>, BrokerError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.psubscribe(keys::progress_pattern(pattern)).await?;
        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            match codec::decode::<ProgressEvent>(&payload) {
                Ok(event) => Some(event),
                Err(err) => {
                    tracing::warn!(error = %err, "Dropping undecodable progress payload");
                    None
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn ping(&self) -> Result<(), BrokerError> {
        let mut con = self.manager.clone();
        let _: String = ::redis::cmd("PING").query_async(&mut con).await?;
        Ok(())
    }
}
