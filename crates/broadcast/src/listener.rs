//! The progress channel listener: the bridge from the pub/sub bus to the
//! connection registry.
//!
//! One long-lived task per server process subscribes to every progress
//! topic and fans each event out to all registered clients. Broadcast is
//! deliberately unfiltered: `subscribe_job` only drives the snapshot, not
//! ongoing delivery.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use parallax_broker::Broker;
use parallax_core::protocol::ServerMessage;

use crate::registry::ClientRegistry;

/// Pause before re-subscribing after the event stream drops.
const RESUBSCRIBE_PAUSE: Duration = Duration::from_secs(5);

/// Run until `cancel` fires.
///
/// The subscription covers every job (`*` pattern). If the stream ends or
/// the subscription fails — a broker connection loss — the listener pauses
/// briefly and subscribes again; events published in that window are lost,
/// which is the channel's documented transient-delivery contract.
pub async fn run_listener(
    broker: Arc<dyn Broker>,
    registry: Arc<ClientRegistry>,
    cancel: CancellationToken,
) {
    loop {
        let mut events = tokio::select! {
            _ = cancel.cancelled() => break,
            subscribed = broker.subscribe("*") => match subscribed {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::error!(error = %err, "Progress subscription failed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RESUBSCRIBE_PAUSE) => continue,
                    }
                }
            },
        };
        tracing::info!("Progress listener subscribed");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Progress listener shutting down");
                    return;
                }
                event = events.next() => match event {
                    Some(event) => {
                        let delivered = registry
                            .broadcast(&ServerMessage::progress(event))
                            .await;
                        tracing::debug!(delivered, "Progress event fanned out");
                    }
                    None => {
                        tracing::warn!("Progress stream ended, re-subscribing");
                        break;
                    }
                },
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(RESUBSCRIBE_PAUSE) => {}
        }
    }
    tracing::info!("Progress listener shutting down");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
