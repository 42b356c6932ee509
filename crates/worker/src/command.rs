//! Stage processor that runs the stage runtime as a subprocess.
//!
//! The harness only brackets the run with a launch event; fine-grained
//! progress comes from the runtime itself, which reports through the
//! broadcast service's `/progress` ingress like any other producer. The
//! runtime learns its job through `PARALLAX_*` environment variables and
//! signals failure with a non-zero exit code.

use async_trait::async_trait;

use parallax_core::job::{JobDescriptor, JobOutput, StagePayload};
use parallax_core::progress::ProgressEvent;

use crate::processor::{StageFailure, StageOutput, StageProcessor};
use crate::reporter::ProgressReporter;

/// Longest stderr excerpt carried into a failure message.
const STDERR_EXCERPT: usize = 500;

/// Runs one configured program per attempt.
pub struct CommandProcessor {
    program: String,
    args: Vec<String>,
    work_dir: String,
}

impl CommandProcessor {
    pub fn new(program: impl Into<String>, args: Vec<String>, work_dir: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            work_dir: work_dir.into(),
        }
    }

    fn job_dir(&self, descriptor: &JobDescriptor) -> String {
        format!("{}/{}", self.work_dir, descriptor.job_id)
    }
}

#[async_trait]
impl StageProcessor for CommandProcessor {
    async fn process(
        &self,
        descriptor: &JobDescriptor,
        reporter: &ProgressReporter,
    ) -> Result<StageOutput, StageFailure> {
        let job_dir = self.job_dir(descriptor);
        let scene_path = format!("{job_dir}/scene");
        let output_path = format!("{job_dir}/scene.blend");

        tokio::fs::create_dir_all(&job_dir).await.map_err(|err| {
            StageFailure::new(format!("Failed to create work directory {job_dir}: {err}"))
        })?;

        reporter
            .report(ProgressEvent::now(
                descriptor.job_id.clone(),
                descriptor.stage,
                0,
                format!("Launching {}", self.program),
            ))
            .await;

        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .env("PARALLAX_JOB_ID", descriptor.job_id.as_str())
            .env("PARALLAX_STAGE", descriptor.stage.as_str())
            .env("PARALLAX_SOURCE_PATH", &descriptor.payload.source_path)
            .env(
                "PARALLAX_SCENE_PATH",
                descriptor.payload.scene_path.as_deref().unwrap_or(&scene_path),
            )
            .env("PARALLAX_OUTPUT_PATH", &output_path)
            .output()
            .await
            .map_err(|err| {
                StageFailure::new(format!("Failed to launch {}: {err}", self.program))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StageFailure::new(format!(
                "{} failed (exit code {:?}): {}",
                self.program,
                output.status.code(),
                tail(stderr.trim(), STDERR_EXCERPT)
            )));
        }

        let produced = if descriptor.stage.successor().is_some() {
            StageOutput {
                payload: StagePayload {
                    source_path: descriptor.payload.source_path.clone(),
                    scene_path: Some(scene_path),
                    output_path: None,
                },
                artifact: None,
            }
        } else {
            let size_bytes = tokio::fs::metadata(&output_path)
                .await
                .map(|meta| meta.len())
                .unwrap_or(0);
            StageOutput {
                payload: StagePayload {
                    source_path: descriptor.payload.source_path.clone(),
                    scene_path: descriptor.payload.scene_path.clone(),
                    output_path: Some(output_path.clone()),
                },
                artifact: Some(JobOutput {
                    path: output_path,
                    size_bytes,
                }),
            }
        };
        Ok(produced)
    }
}

/// Last `max` bytes of `text`, rounded forward to a char boundary.
fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parallax_broker::MemoryBroker;
    use parallax_core::stage::Stage;
    use parallax_core::types::JobId;

    use super::*;

    fn reporter() -> ProgressReporter {
        ProgressReporter::new(Arc::new(MemoryBroker::new()))
    }

    fn work_dir() -> String {
        std::env::temp_dir()
            .join("parallax-worker-tests")
            .to_string_lossy()
            .to_string()
    }

    #[tokio::test]
    async fn zero_exit_yields_stage_output_for_the_next_stage() {
        let processor =
            CommandProcessor::new("sh", vec!["-c".into(), "exit 0".into()], work_dir());
        let descriptor = JobDescriptor::first_stage(JobId::new(), "/uploads/a.mp4", 3);

        let output = processor.process(&descriptor, &reporter()).await.unwrap();
        assert!(output.payload.scene_path.is_some());
        assert!(output.artifact.is_none());
    }

    #[tokio::test]
    async fn final_stage_collects_the_artifact() {
        let processor = CommandProcessor::new(
            "sh",
            vec!["-c".into(), "printf scene > \"$PARALLAX_OUTPUT_PATH\"".into()],
            work_dir(),
        );
        let descriptor = JobDescriptor {
            stage: Stage::Import,
            ..JobDescriptor::first_stage(JobId::new(), "/uploads/a.mp4", 3)
        };

        let output = processor.process(&descriptor, &reporter()).await.unwrap();
        let artifact = output.artifact.unwrap();
        assert!(artifact.path.ends_with("scene.blend"));
        assert_eq!(artifact.size_bytes, 5);
        assert_eq!(output.payload.output_path.as_deref(), Some(artifact.path.as_str()));
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_stage_failure_with_stderr() {
        let processor = CommandProcessor::new(
            "sh",
            vec!["-c".into(), "echo solver crashed >&2; exit 3".into()],
            work_dir(),
        );
        let descriptor = JobDescriptor::first_stage(JobId::new(), "/uploads/a.mp4", 3);

        let err = processor.process(&descriptor, &reporter()).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("exit code Some(3)"), "{message}");
        assert!(message.contains("solver crashed"), "{message}");
    }

    #[tokio::test]
    async fn missing_program_is_a_stage_failure() {
        let processor = CommandProcessor::new(
            "parallax-no-such-runtime",
            Vec::new(),
            work_dir(),
        );
        let descriptor = JobDescriptor::first_stage(JobId::new(), "/uploads/a.mp4", 3);

        let err = processor.process(&descriptor, &reporter()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to launch"));
    }

    #[tokio::test]
    async fn runtime_receives_job_environment() {
        let processor = CommandProcessor::new(
            "sh",
            vec![
                "-c".into(),
                "test \"$PARALLAX_STAGE\" = reconstruct && test -n \"$PARALLAX_SOURCE_PATH\""
                    .into(),
            ],
            work_dir(),
        );
        let descriptor = JobDescriptor::first_stage(JobId::new(), "/uploads/a.mp4", 3);

        assert!(processor.process(&descriptor, &reporter()).await.is_ok());
    }

    #[test]
    fn tail_respects_char_boundaries() {
        assert_eq!(tail("abcdef", 4), "cdef");
        assert_eq!(tail("ab", 4), "ab");
        // A multi-byte char straddling the cut is skipped, not split.
        assert_eq!(tail("xéy", 2), "y");
    }
}
