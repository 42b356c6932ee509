//! Handlers for the `/jobs` resource.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use parallax_broker::{JobQueue, JobStore};
use parallax_core::job::{JobDescriptor, JobRecord};
use parallax_core::types::JobId;
use parallax_core::validate::validate_source_path;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for job submission.
#[derive(Debug, Deserialize)]
pub struct SubmitJob {
    /// Path to the source footage, as visible to the stage workers.
    pub source_path: String,
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Ingest a new processing job. The store record is written before the
/// descriptor is enqueued, so a worker that pops immediately always finds
/// the record. Returns 201 with the initial record.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<SubmitJob>,
) -> AppResult<impl IntoResponse> {
    validate_source_path(&input.source_path)?;

    let job_id = JobId::new();
    let record = JobRecord::new(job_id.clone(), input.source_path.clone());
    state.broker.put(&record).await?;

    let descriptor =
        JobDescriptor::first_stage(job_id.clone(), input.source_path, state.config.max_retries);
    state.broker.enqueue(descriptor.stage, &descriptor).await?;

    tracing::info!(
        job_id = %job_id,
        stage = %descriptor.stage,
        source_path = %record.source_path,
        "Job ingested",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: record })))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
///
/// Current record for one job, straight from the store.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let record = state
        .broker
        .get(&job_id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            entity: "Job",
            id: job_id.to_string(),
        })?;

    Ok(Json(DataResponse { data: record }))
}
