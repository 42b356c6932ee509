//! Handler modules backing the route definitions.

pub mod jobs;
