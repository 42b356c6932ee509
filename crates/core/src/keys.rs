//! Queue, store, and topic naming shared by every component.
//!
//! These names are load-bearing: workers, the gateway, and the broadcast
//! server address the same lists and topics by these exact strings, and the
//! deployed dashboards subscribe to them.

use crate::stage::Stage;
use crate::types::JobId;

/// Queue list for one stage.
pub fn stage_queue(stage: Stage) -> String {
    format!("{stage}_jobs")
}

/// Dead-letter list for one stage. Entries are never auto-retried.
pub fn stage_deadletter(stage: Stage) -> String {
    format!("failed_{stage}_jobs")
}

/// Job store key for one record.
pub fn job_record(job_id: &JobId) -> String {
    format!("job:{job_id}")
}

/// Progress topic for one job.
pub fn progress_topic(job_id: &JobId) -> String {
    format!("progress:{job_id}")
}

/// Subscription pattern covering progress topics whose job id matches
/// `pattern` (`*` wildcards).
pub fn progress_pattern(pattern: &str) -> String {
    format!("progress:{pattern}")
}
