//! Shared vocabulary for the parallax pipeline: job identifiers, stages,
//! statuses, queue descriptors, progress events, and the client protocol.
//!
//! Depends only on serde-family crates so services and workers can share it
//! without pulling in runtime or transport machinery.

pub mod error;
pub mod job;
pub mod keys;
pub mod progress;
pub mod protocol;
pub mod stage;
pub mod status;
pub mod types;
pub mod validate;
