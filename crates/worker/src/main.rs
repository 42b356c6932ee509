use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parallax_broker::{Broker, RedisBroker};
use parallax_worker::{CommandProcessor, ProgressReporter, StageWorker, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parallax_worker=debug,parallax_broker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    tracing::info!(stage = %config.stage, redis_url = %config.redis_url, "Loaded worker configuration");

    // --- Broker ---
    let broker: Arc<dyn Broker> = Arc::new(
        RedisBroker::connect(&config.redis_url)
            .await
            .expect("Failed to connect to Redis"),
    );
    broker.ping().await.expect("Redis health check failed");
    tracing::info!("Redis health check passed");

    // --- Progress reporting ---
    let mut reporter = ProgressReporter::new(Arc::clone(&broker));
    if let Some(url) = &config.progress_push_url {
        reporter = reporter.with_push(url.clone());
        tracing::info!(url = %url, "Progress push enabled");
    }

    // --- Stage processor ---
    let processor = Arc::new(CommandProcessor::new(
        config.stage_command.clone(),
        config.stage_args.clone(),
        config.work_dir.clone(),
    ));
    tracing::info!(command = %config.stage_command, "Stage processor ready");

    // --- Worker loop ---
    let worker = StageWorker::new(config.stage, broker, processor, reporter)
        .with_retry_policy(config.retry.clone())
        .with_dequeue_timeout(Duration::from_secs(config.dequeue_timeout_secs));

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    worker.run(cancel).await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the worker
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
