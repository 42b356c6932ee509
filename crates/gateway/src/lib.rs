//! HTTP ingestion gateway for the parallax pipeline.
//!
//! Accepts job submissions, writes the initial store record, and enqueues
//! the first-stage descriptor. Status reads come straight from the job
//! store; live progress streaming is the broadcast service's job, not ours.

pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
