use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a recording as the backend reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    Active,
    Paused,
    Ended,
}

/// Recording metadata returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    /// Backend-issued opaque identifier.
    pub id: String,

    pub status: RecordingStatus,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,

    /// Present once downstream transcription has completed.
    pub transcription_text: Option<String>,

    /// Free-text notes attached by the user.
    pub notes: Option<String>,

    /// Number of chunks the backend has accepted so far.
    #[serde(default)]
    pub chunks_count: u64,
}
