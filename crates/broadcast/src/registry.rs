//! Live client connection registry.
//!
//! One instance per broadcast server process, never shared across processes;
//! cross-instance fan-out goes through the progress channel, not through
//! this map. Each connection is represented by the sender half of an
//! unbounded channel, so one slow or dead peer can never block a broadcast
//! pass over the others.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};

use parallax_core::protocol::ServerMessage;

/// Channel sender half for pushing frames to a WebSocket connection.
pub type ClientSender = mpsc::UnboundedSender<Message>;

/// All live client connections, keyed by client id.
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, ClientSender>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Claim `client_id` for the given connection.
    ///
    /// Close-old-on-new: if another connection already holds the id, it is
    /// sent a Close frame before being replaced. Re-registering the same
    /// connection under the same id is a no-op.
    pub async fn register(&self, client_id: impl Into<String>, sender: ClientSender) {
        let mut clients = self.clients.write().await;
        claim(&mut clients, client_id.into(), sender);
    }

    /// Move a connection from `old_id` to `client_id` in one pass, so no
    /// broadcast can observe the connection under both ids. The old entry
    /// is only released if it still belongs to this connection.
    pub async fn rename(&self, old_id: &str, client_id: impl Into<String>, sender: ClientSender) {
        let client_id = client_id.into();
        let mut clients = self.clients.write().await;
        let still_ours = old_id != client_id
            && clients
                .get(old_id)
                .is_some_and(|current| current.same_channel(&sender));
        if still_ours {
            clients.remove(old_id);
        }
        claim(&mut clients, client_id, sender);
    }

    /// Remove a connection by id. Idempotent.
    pub async fn unregister(&self, client_id: &str) {
        if self.clients.write().await.remove(client_id).is_some() {
            tracing::debug!(client_id = %client_id, "Client unregistered");
        }
    }

    /// Best-effort send of one message to one client.
    ///
    /// Returns `false` if the client is unknown or its connection is gone;
    /// a dead connection is unregistered before returning. No retry, no
    /// buffering for reconnects.
    pub async fn send(&self, client_id: &str, message: &ServerMessage) -> bool {
        let Some(frame) = encode(message) else {
            return false;
        };
        let delivered = match self.clients.read().await.get(client_id) {
            Some(sender) => sender.send(frame).is_ok(),
            None => return false,
        };
        if !delivered {
            tracing::debug!(client_id = %client_id, "Send failed, dropping client");
            self.unregister(client_id).await;
        }
        delivered
    }

    /// Send one message to every registered connection.
    ///
    /// Connections whose channel is closed are unregistered in the same
    /// pass. Returns the number of clients the message reached.
    pub async fn broadcast(&self, message: &ServerMessage) -> usize {
        let Some(frame) = encode(message) else {
            return 0;
        };
        let mut failed = Vec::new();
        let delivered = {
            let clients = self.clients.read().await;
            let mut delivered = 0;
            for (client_id, sender) in clients.iter() {
                if sender.send(frame.clone()).is_ok() {
                    delivered += 1;
                } else {
                    failed.push((client_id.clone(), sender.clone()));
                }
            }
            delivered
        };
        if !failed.is_empty() {
            self.prune_failed(failed).await;
        }
        delivered
    }

    /// Drop the connections whose broadcast send failed.
    ///
    /// Between the send pass and this one the id may have been re-claimed by
    /// a fresh connection; only remove an entry that still holds the sender
    /// that failed.
    async fn prune_failed(&self, failed: Vec<(String, ClientSender)>) {
        let mut clients = self.clients.write().await;
        for (client_id, stale) in failed {
            let still_stale = clients
                .get(&client_id)
                .is_some_and(|current| current.same_channel(&stale));
            if still_stale {
                clients.remove(&client_id);
                tracing::debug!(client_id = %client_id, "Broadcast send failed, client dropped");
            }
        }
    }

    /// Ping every connection. Dead connections surface on their next
    /// broadcast or receive-loop iteration.
    pub async fn ping_all(&self) {
        let clients = self.clients.read().await;
        for sender in clients.values() {
            let _ = sender.send(Message::Ping(Bytes::new()));
        }
    }

    /// Current number of live connections.
    pub async fn count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Send a Close frame to every connection, then clear the map. Used
    /// during graceful shutdown.
    pub async fn shutdown_all(&self) {
        let mut clients = self.clients.write().await;
        let count = clients.len();
        for sender in clients.values() {
            let _ = sender.send(Message::Close(None));
        }
        clients.clear();
        tracing::info!(count, "Closed all client connections");
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn claim(clients: &mut HashMap<String, ClientSender>, client_id: String, sender: ClientSender) {
    match clients.insert(client_id.clone(), sender.clone()) {
        Some(previous) if !previous.same_channel(&sender) => {
            let _ = previous.send(Message::Close(None));
            tracing::info!(
                client_id = %client_id,
                "Superseded previous connection under the same client id"
            );
        }
        _ => {}
    }
}

fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(err) => {
            tracing::error!(error = %err, "Failed to encode server message");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ack() -> ServerMessage {
        ServerMessage::connected("anyone")
    }

    fn connection() -> (ClientSender, mpsc::UnboundedReceiver<Message>) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn send_reaches_a_registered_client() {
        let registry = ClientRegistry::new();
        let (tx, mut rx) = connection();
        registry.register("c1", tx).await;

        assert!(registry.send("c1", &ack()).await);
        let frame = rx.recv().await.unwrap();
        assert!(matches!(frame, Message::Text(_)));
    }

    #[tokio::test]
    async fn send_to_unknown_client_reports_failure() {
        let registry = ClientRegistry::new();
        assert!(!registry.send("ghost", &ack()).await);
    }

    #[tokio::test]
    async fn send_to_a_dead_connection_unregisters_it() {
        let registry = ClientRegistry::new();
        let (tx, rx) = connection();
        registry.register("c1", tx).await;
        drop(rx);

        assert!(!registry.send("c1", &ack()).await);
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_id_closes_the_superseded_connection() {
        let registry = ClientRegistry::new();
        let (old_tx, mut old_rx) = connection();
        let (new_tx, mut new_rx) = connection();
        registry.register("dash", old_tx).await;
        registry.register("dash", new_tx).await;

        let frame = old_rx.recv().await.unwrap();
        assert!(matches!(frame, Message::Close(_)));

        // Only the new connection receives traffic.
        assert!(registry.send("dash", &ack()).await);
        assert!(matches!(new_rx.recv().await.unwrap(), Message::Text(_)));
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn reregistering_the_same_connection_does_not_close_it() {
        let registry = ClientRegistry::new();
        let (tx, mut rx) = connection();
        registry.register("dash", tx.clone()).await;
        registry.register("dash", tx).await;

        assert!(registry.send("dash", &ack()).await);
        assert!(matches!(rx.recv().await.unwrap(), Message::Text(_)));
    }

    #[tokio::test]
    async fn broadcast_drops_failed_clients_in_the_same_pass() {
        let registry = ClientRegistry::new();
        let (tx1, rx1) = connection();
        let (tx2, mut rx2) = connection();
        registry.register("c1", tx1).await;
        registry.register("c2", tx2).await;
        drop(rx1); // simulated closed socket

        let delivered = registry.broadcast(&ack()).await;
        assert_eq!(delivered, 1);
        assert_eq!(registry.count().await, 1);
        assert!(matches!(rx2.recv().await.unwrap(), Message::Text(_)));
    }

    #[tokio::test]
    async fn rename_moves_the_connection_in_one_pass() {
        let registry = ClientRegistry::new();
        let (tx, mut rx) = connection();
        registry.register("client-generated", tx.clone()).await;

        registry.rename("client-generated", "dash", tx).await;
        assert_eq!(registry.count().await, 1);

        // A broadcast after the swap reaches the connection exactly once.
        let delivered = registry.broadcast(&ack()).await;
        assert_eq!(delivered, 1);
        assert!(matches!(rx.try_recv().unwrap(), Message::Text(_)));
        assert!(rx.try_recv().is_err(), "frame delivered under both ids");
    }

    #[tokio::test]
    async fn rename_leaves_a_reclaimed_old_id_alone() {
        let registry = ClientRegistry::new();
        let (moving_tx, _moving_rx) = connection();
        let (other_tx, mut other_rx) = connection();
        // "dash" now belongs to a different connection than the one moving
        // away from it.
        registry.register("dash", other_tx).await;

        registry.rename("dash", "dash-2", moving_tx).await;
        assert!(registry.send("dash", &ack()).await);
        assert!(matches!(other_rx.recv().await.unwrap(), Message::Text(_)));
        assert_eq!(registry.count().await, 2);
    }

    #[tokio::test]
    async fn prune_skips_an_id_reclaimed_by_a_fresh_connection() {
        let registry = ClientRegistry::new();
        let (stale_tx, _) = connection();
        let (fresh_tx, mut fresh_rx) = connection();
        registry.register("c1", fresh_tx).await;

        // A failure recorded against the stale sender must not evict the
        // fresh connection now holding the id.
        registry
            .prune_failed(vec![("c1".to_string(), stale_tx)])
            .await;
        assert_eq!(registry.count().await, 1);
        assert!(registry.send("c1", &ack()).await);
        assert!(matches!(fresh_rx.recv().await.unwrap(), Message::Text(_)));
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = connection();
        registry.register("c1", tx).await;

        registry.unregister("c1").await;
        registry.unregister("c1").await;
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn shutdown_sends_close_and_clears() {
        let registry = ClientRegistry::new();
        let (tx, mut rx) = connection();
        registry.register("c1", tx).await;

        registry.shutdown_all().await;
        assert!(matches!(rx.recv().await.unwrap(), Message::Close(_)));
        assert_eq!(registry.count().await, 0);
    }
}
