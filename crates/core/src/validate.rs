//! Ingestion input validation.
//!
//! Validation failures are synchronous and surfaced to the submitter; a job
//! that fails validation is never queued.

use crate::error::CoreError;

/// File extensions accepted for source footage.
pub const ALLOWED_SOURCE_EXTENSIONS: [&str; 4] = ["mp4", "mov", "avi", "mkv"];

/// Validate a source footage path submitted for ingestion.
///
/// Rules:
/// - Must not be empty or whitespace.
/// - Must carry one of the allowed video extensions (case-insensitive).
pub fn validate_source_path(path: &str) -> Result<(), CoreError> {
    if path.trim().is_empty() {
        return Err(CoreError::Validation(
            "Source path must not be empty".to_string(),
        ));
    }
    let extension = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension {
        Some(ext) if ALLOWED_SOURCE_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(CoreError::Validation(format!(
            "Unsupported source file type (expected one of: {})",
            ALLOWED_SOURCE_EXTENSIONS.join(", ")
        ))),
    }
}
