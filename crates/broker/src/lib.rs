//! Broker contracts and backends: stage queues with dead-lettering, the
//! shared job store, and the transient progress channel.
//!
//! Two backends implement the same contracts: [`memory::MemoryBroker`] for
//! tests and single-process runs, [`redis::RedisBroker`] for production.

pub mod codec;
pub mod contract;
pub mod error;
pub mod memory;
pub mod redis;

pub use contract::{BoxStream, Broker, JobQueue, JobStore, ProgressChannel};
pub use error::BrokerError;
pub use memory::MemoryBroker;
pub use redis::RedisBroker;
