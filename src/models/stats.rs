use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Snapshot of the capture session occupying the slot
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,

    /// Interface named in the request
    pub interface: String,

    pub started_at: DateTime<Utc>,

    /// Frames read from the capture source
    pub frames_captured: u64,

    /// Records that passed the filter and reached the stream
    pub records_forwarded: u64,
}
