//! Periodic keepalive pings.

use std::sync::Arc;
use std::time::Duration;

use crate::registry::ClientRegistry;

/// Spawn a background task that sends a Ping frame to every connected
/// client on each tick.
///
/// Runs for the process lifetime; the returned handle is aborted during
/// shutdown. Clients that stop answering surface as send failures on their
/// next broadcast pass.
pub fn start_heartbeat(
    registry: Arc<ClientRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let count = registry.count().await;
            tracing::debug!(count, "WebSocket heartbeat ping");
            registry.ping_all().await;
        }
    })
}
