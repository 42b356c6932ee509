//! Progress events streamed from workers to connected clients.

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};

use crate::stage::Stage;
use crate::types::JobId;

/// A single progress report for one job.
///
/// Ephemeral: delivered to whoever is subscribed at publish time and never
/// persisted. `timestamp` is float Unix seconds, the format the deployed
/// dashboards already parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub stage: Stage,
    /// Percent complete, 0 to 100. Clamped on every ingest path, including
    /// events pushed by external collaborators.
    #[serde(deserialize_with = "clamp_percent")]
    pub progress: u8,
    pub message: String,
    pub timestamp: f64,
}

fn clamp_percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let value = u8::deserialize(deserializer)?;
    Ok(value.min(100))
}

impl ProgressEvent {
    /// Build an event stamped with the current time. `progress` values above
    /// 100 are clamped.
    pub fn now(job_id: JobId, stage: Stage, progress: u8, message: impl Into<String>) -> Self {
        Self {
            job_id,
            stage,
            progress: progress.min(100),
            message: message.into(),
            timestamp: unix_now(),
        }
    }
}

/// Current time as float Unix seconds.
pub fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1e6
}
