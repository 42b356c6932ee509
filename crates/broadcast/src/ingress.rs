//! HTTP ingress: direct progress push, metrics relay, health.
//!
//! `POST /progress` exists for collaborators that cannot publish to the
//! pub/sub bus (the stage runtimes behind a network boundary). It
//! re-publishes onto the progress channel, so pushed events flow through
//! the same listener → broadcast pipeline as bus-published ones and reach
//! every server instance, not just this one.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use parallax_core::progress::ProgressEvent;
use parallax_core::protocol::ServerMessage;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Acknowledgement body for an accepted progress push.
#[derive(Serialize)]
pub struct PushAck {
    pub published: bool,
}

/// Acknowledgement body for a metrics relay.
#[derive(Serialize)]
pub struct MetricsAck {
    /// Number of clients the payload reached.
    pub delivered: usize,
}

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the broker is reachable.
    pub broker_healthy: bool,
    /// Live WebSocket connections on this instance.
    pub connections: usize,
}

/// POST /progress
///
/// Accept one progress event out-of-band. Semantically equivalent to a
/// channel publish.
pub async fn push_progress(
    State(state): State<AppState>,
    Json(event): Json<ProgressEvent>,
) -> AppResult<impl IntoResponse> {
    state.broker.publish(&event).await?;
    tracing::debug!(
        job_id = %event.job_id,
        stage = %event.stage,
        progress = event.progress,
        "Progress event pushed via HTTP"
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: PushAck { published: true },
        }),
    ))
}

/// POST /metrics
///
/// Relay an operational-metrics payload to every connected client,
/// verbatim. Bypasses the progress channel: metrics are not job events,
/// and the pushing collaborator addresses each server instance directly.
pub async fn push_metrics(
    State(state): State<AppState>,
    Json(data): Json<Value>,
) -> impl IntoResponse {
    let delivered = state
        .registry
        .broadcast(&ServerMessage::SystemMetrics { data })
        .await;
    Json(DataResponse {
        data: MetricsAck { delivered },
    })
}

/// GET /health -- service, broker, and connection-count health.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let broker_healthy = state.broker.ping().await.is_ok();
    let status = if broker_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        broker_healthy,
        connections: state.registry.count().await,
    })
}
