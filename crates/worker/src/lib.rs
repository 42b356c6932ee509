//! Stage worker for the parallax pipeline.
//!
//! A worker binds to exactly one pipeline stage. It blocks on that stage's
//! queue, runs the stage processor for each descriptor it pops, and then
//! either hands the job to the next stage, schedules a retry, or settles the
//! job as completed or failed. All state transitions go through the broker;
//! the worker itself is stateless and can be scaled horizontally.

pub mod command;
pub mod config;
pub mod processor;
pub mod reporter;
pub mod retry;
pub mod runner;

pub use command::CommandProcessor;
pub use config::WorkerConfig;
pub use processor::{StageFailure, StageOutput, StageProcessor};
pub use reporter::ProgressReporter;
pub use retry::RetryPolicy;
pub use runner::StageWorker;
