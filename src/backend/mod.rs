//! Recording backend contract.
//!
//! The remote store and transcription service is consumed through the
//! [`RecordingBackend`] trait; [`HttpBackend`] is the production client and
//! tests substitute their own implementations.

mod http;
mod types;

pub use http::HttpBackend;
pub use types::{Recording, RecordingStatus};

use async_trait::async_trait;

use crate::error::BackendError;

/// Client-side view of the recording service.
#[async_trait]
pub trait RecordingBackend: Send + Sync {
    /// Create a new recording session; returns its metadata with the
    /// backend-issued identifier.
    async fn create_recording(&self) -> Result<Recording, BackendError>;

    /// Upload one chunk of audio. Chunks for the same recording carry
    /// strictly increasing indices but may arrive out of order.
    async fn upload_chunk(
        &self,
        recording_id: &str,
        chunk_index: u64,
        payload: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError>;

    /// Tell the backend the session was paused. Best-effort.
    async fn pause_recording(&self, recording_id: &str) -> Result<(), BackendError>;

    /// Mark the recording finished; this triggers downstream transcription.
    async fn finish_recording(&self, recording_id: &str) -> Result<(), BackendError>;

    /// Replace the free-text notes on a recording.
    async fn update_notes(
        &self,
        recording_id: &str,
        notes: &str,
    ) -> Result<Recording, BackendError>;

    /// List the caller's recordings.
    async fn list_recordings(&self) -> Result<Vec<Recording>, BackendError>;

    /// Fetch one recording with status, transcription text and notes.
    async fn get_recording(&self, recording_id: &str) -> Result<Recording, BackendError>;
}
