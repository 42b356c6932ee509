//! Wire protocol between the broadcast server and its WebSocket clients.
//!
//! All frames are JSON text discriminated by a `type` field. The shapes here
//! are frozen: the deployed viewer dashboards parse them as-is.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::job::JobRecord;
use crate::progress::ProgressEvent;
use crate::types::JobId;

/// Frames a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Claim a client id. Expected before anything else; the server assigns
    /// a generated id to connections that skip it.
    Identify { client_id: String },
    /// Request an immediate snapshot of one job's record. The live stream is
    /// unaffected.
    SubscribeJob { job_id: JobId },
}

/// Frames the server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Registration acknowledgement.
    Connection { status: String, client_id: String },
    /// One-shot job store snapshot answering `subscribe_job`.
    JobStatus { job_id: JobId, data: JobRecord },
    /// Live progress fan-out.
    ProgressUpdate { job_id: JobId, data: ProgressEvent },
    /// Operational metrics pushed by collaborators, relayed verbatim.
    SystemMetrics { data: Value },
}

impl ServerMessage {
    /// Ack for a successful registration.
    pub fn connected(client_id: impl Into<String>) -> Self {
        ServerMessage::Connection {
            status: "connected".to_string(),
            client_id: client_id.into(),
        }
    }

    pub fn job_status(record: JobRecord) -> Self {
        ServerMessage::JobStatus {
            job_id: record.job_id.clone(),
            data: record,
        }
    }

    pub fn progress(event: ProgressEvent) -> Self {
        ServerMessage::ProgressUpdate {
            job_id: event.job_id.clone(),
            data: event,
        }
    }
}
