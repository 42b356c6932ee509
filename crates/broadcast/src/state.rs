use std::sync::Arc;

use parallax_broker::Broker;

use crate::config::BroadcastConfig;
use crate::registry::ClientRegistry;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Queue, store, and progress-channel backend.
    pub broker: Arc<dyn Broker>,
    /// Live client connections, owned by this process alone.
    pub registry: Arc<ClientRegistry>,
    /// Server configuration.
    pub config: Arc<BroadcastConfig>,
}
