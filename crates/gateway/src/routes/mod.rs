//! API route modules.

use axum::Router;

use crate::state::AppState;

pub mod health;
pub mod jobs;

/// All routes mounted under `/api/v1`.
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/jobs", jobs::router())
}
