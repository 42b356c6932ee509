use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use parallax_broker::BrokerError;

/// Application-level error type for the broadcast service's HTTP handlers.
///
/// The WebSocket path never returns errors to clients; transport failures
/// there degrade to "client disconnected". This type only covers the push
/// ingress and health endpoints.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A broker error from the progress channel or job store.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Broker(err) => {
                tracing::error!(error = %err, "Broker error");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "BROKER_UNAVAILABLE",
                    "The job broker is unavailable".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
