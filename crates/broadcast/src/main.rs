use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parallax_broadcast::config::BroadcastConfig;
use parallax_broadcast::heartbeat::start_heartbeat;
use parallax_broadcast::listener::run_listener;
use parallax_broadcast::registry::ClientRegistry;
use parallax_broadcast::router::build_app_router;
use parallax_broadcast::state::AppState;
use parallax_broker::{Broker, RedisBroker};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parallax_broadcast=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = BroadcastConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded broadcast configuration");

    // --- Broker ---
    let broker: Arc<dyn Broker> = Arc::new(
        RedisBroker::connect(&config.redis_url)
            .await
            .expect("Failed to connect to Redis"),
    );
    broker.ping().await.expect("Redis health check failed");
    tracing::info!("Redis health check passed");

    // --- Connection registry + background tasks ---
    let registry = Arc::new(ClientRegistry::new());
    let cancel = CancellationToken::new();

    let listener_task = tokio::spawn(run_listener(
        Arc::clone(&broker),
        Arc::clone(&registry),
        cancel.clone(),
    ));
    let heartbeat_task = start_heartbeat(
        Arc::clone(&registry),
        Duration::from_secs(config.heartbeat_interval_secs),
    );

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            cancel.cancel();
        });
    }

    // --- App state ---
    let state = AppState {
        broker,
        registry: Arc::clone(&registry),
        config: Arc::new(config.clone()),
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting broadcast server");

    let tcp = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    // Close client sockets on shutdown so graceful drain does not wait on
    // long-lived WebSocket connections.
    let shutdown = {
        let cancel = cancel.clone();
        let registry = Arc::clone(&registry);
        async move {
            cancel.cancelled().await;
            registry.shutdown_all().await;
        }
    };

    axum::serve(tcp, app)
        .with_graceful_shutdown(shutdown)
        .await
        .expect("Server error");

    heartbeat_task.abort();
    listener_task.await.ok();
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
