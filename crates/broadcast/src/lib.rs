//! WebSocket fan-out server for the parallax pipeline.
//!
//! Subscribes to every progress topic and forwards each event to all
//! connected clients. Clients identify themselves, may request one-shot job
//! snapshots, and otherwise just listen. A direct HTTP push ingress accepts
//! progress events from collaborators that cannot publish to the bus.

pub mod config;
pub mod error;
pub mod handler;
pub mod heartbeat;
pub mod ingress;
pub mod listener;
pub mod registry;
pub mod response;
pub mod router;
pub mod state;

pub use config::BroadcastConfig;
pub use heartbeat::start_heartbeat;
pub use listener::run_listener;
pub use registry::ClientRegistry;
