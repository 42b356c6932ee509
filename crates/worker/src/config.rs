use std::time::Duration;

use parallax_core::stage::Stage;

use crate::retry::{RetryPolicy, DEFAULT_RETRY_DELAY};

/// Worker configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Redis connection string (default: `redis://127.0.0.1/`).
    pub redis_url: String,
    /// Pipeline stage this worker serves (default: `reconstruct`).
    pub stage: Stage,
    /// Pause applied between a failed attempt and its re-enqueue.
    pub retry: RetryPolicy,
    /// How long one blocking dequeue waits, in seconds (default: `60`).
    pub dequeue_timeout_secs: u64,
    /// Optional HTTP ingress to also push progress events to.
    pub progress_push_url: Option<String>,
    /// Program run for each attempt (default depends on the stage).
    pub stage_command: String,
    /// Extra arguments passed to the stage command.
    pub stage_args: Vec<String>,
    /// Root directory for per-job work directories (default: `./data/jobs`).
    pub work_dir: String,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `REDIS_URL`            | `redis://127.0.0.1/`       |
    /// | `STAGE`                | `reconstruct`              |
    /// | `RETRY_BACKOFF`        | `fixed`                    |
    /// | `RETRY_DELAY_SECS`     | `30`                       |
    /// | `RETRY_MAX_DELAY_SECS` | `300`                      |
    /// | `DEQUEUE_TIMEOUT_SECS` | `60`                       |
    /// | `PROGRESS_PUSH_URL`    | (unset)                    |
    /// | `STAGE_COMMAND`        | `colmap` / `blender`       |
    /// | `STAGE_ARGS`           | (empty)                    |
    /// | `WORK_DIR`             | `./data/jobs`              |
    pub fn from_env() -> Self {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into());

        let stage: Stage = std::env::var("STAGE")
            .unwrap_or_else(|_| "reconstruct".into())
            .parse()
            .expect("STAGE must be `reconstruct` or `import`");

        let retry_delay_secs: u64 = std::env::var("RETRY_DELAY_SECS")
            .unwrap_or_else(|_| DEFAULT_RETRY_DELAY.as_secs().to_string())
            .parse()
            .expect("RETRY_DELAY_SECS must be a valid u64");

        let retry_max_delay_secs: u64 = std::env::var("RETRY_MAX_DELAY_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("RETRY_MAX_DELAY_SECS must be a valid u64");

        let retry = match std::env::var("RETRY_BACKOFF")
            .unwrap_or_else(|_| "fixed".into())
            .as_str()
        {
            "fixed" => RetryPolicy::fixed(Duration::from_secs(retry_delay_secs)),
            "exponential" => RetryPolicy::exponential(
                Duration::from_secs(retry_delay_secs),
                Duration::from_secs(retry_max_delay_secs),
            ),
            other => panic!("RETRY_BACKOFF must be `fixed` or `exponential`, got `{other}`"),
        };

        let dequeue_timeout_secs: u64 = std::env::var("DEQUEUE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("DEQUEUE_TIMEOUT_SECS must be a valid u64");

        let progress_push_url = std::env::var("PROGRESS_PUSH_URL").ok();

        let stage_command = std::env::var("STAGE_COMMAND").unwrap_or_else(|_| {
            match stage {
                Stage::Reconstruct => "colmap",
                Stage::Import => "blender",
            }
            .to_string()
        });

        let stage_args: Vec<String> = std::env::var("STAGE_ARGS")
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let work_dir = std::env::var("WORK_DIR").unwrap_or_else(|_| "./data/jobs".into());

        Self {
            redis_url,
            stage,
            retry,
            dequeue_timeout_secs,
            progress_push_url,
            stage_command,
            stage_args,
            work_dir,
        }
    }
}
