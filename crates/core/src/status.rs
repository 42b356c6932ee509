//! Job lifecycle status with the `{phase}_{stage}` wire encoding shared by
//! every component that reads or writes job records.

use std::fmt;

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};

use crate::error::CoreError;
use crate::stage::Stage;

/// Lifecycle status of a job.
///
/// Transitions are monotonic except for retry cycles
/// (`Queued → Processing → Retry → Processing → … → Completed | Failed`).
/// `Completed` and `Failed` are terminal; `JobRecord` refuses writes past
/// either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Waiting in a stage queue.
    Queued,
    /// Popped by a worker of the given stage.
    Processing(Stage),
    /// Failed within budget, waiting to re-enter the stage queue.
    Retry(Stage),
    /// All stages finished successfully.
    Completed,
    /// Retry budget exhausted at the given stage.
    Failed(Stage),
}

impl JobStatus {
    /// Wire string, e.g. `processing_reconstruct`.
    pub fn as_wire(&self) -> String {
        match self {
            JobStatus::Queued => "queued".to_string(),
            JobStatus::Processing(stage) => format!("processing_{stage}"),
            JobStatus::Retry(stage) => format!("retry_{stage}"),
            JobStatus::Completed => "completed".to_string(),
            JobStatus::Failed(stage) => format!("failed_{stage}"),
        }
    }

    /// Parse a wire string produced by [`JobStatus::as_wire`].
    pub fn parse_wire(s: &str) -> Result<Self, CoreError> {
        if s == "queued" {
            return Ok(JobStatus::Queued);
        }
        if s == "completed" {
            return Ok(JobStatus::Completed);
        }
        if let Some(stage) = s.strip_prefix("processing_") {
            return Ok(JobStatus::Processing(stage.parse()?));
        }
        if let Some(stage) = s.strip_prefix("retry_") {
            return Ok(JobStatus::Retry(stage.parse()?));
        }
        if let Some(stage) = s.strip_prefix("failed_") {
            return Ok(JobStatus::Failed(stage.parse()?));
        }
        Err(CoreError::Validation(format!(
            "Unknown job status: \"{s}\""
        )))
    }

    /// Terminal statuses admit no further transitions.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed(_))
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_wire())
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_wire())
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        JobStatus::parse_wire(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_strings_match_deployed_format() {
        assert_eq!(JobStatus::Queued.as_wire(), "queued");
        assert_eq!(
            JobStatus::Processing(Stage::Reconstruct).as_wire(),
            "processing_reconstruct"
        );
        assert_eq!(JobStatus::Retry(Stage::Import).as_wire(), "retry_import");
        assert_eq!(JobStatus::Completed.as_wire(), "completed");
        assert_eq!(JobStatus::Failed(Stage::Import).as_wire(), "failed_import");
    }

    #[test]
    fn wire_round_trip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing(Stage::Import),
            JobStatus::Retry(Stage::Reconstruct),
            JobStatus::Completed,
            JobStatus::Failed(Stage::Reconstruct),
        ] {
            assert_eq!(JobStatus::parse_wire(&status.as_wire()).unwrap(), status);
        }
    }

    #[test]
    fn unknown_wire_strings_rejected() {
        assert!(JobStatus::parse_wire("pending").is_err());
        assert!(JobStatus::parse_wire("processing_colmap").is_err());
        assert!(JobStatus::parse_wire("").is_err());
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed(Stage::Import).is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing(Stage::Import).is_terminal());
        assert!(!JobStatus::Retry(Stage::Import).is_terminal());
    }

    #[test]
    fn serializes_as_wire_string() {
        let json = serde_json::to_string(&JobStatus::Processing(Stage::Import)).unwrap();
        assert_eq!(json, "\"processing_import\"");
        let back: JobStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, JobStatus::Processing(Stage::Import));
    }
}
