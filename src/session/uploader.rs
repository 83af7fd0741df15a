use std::sync::Arc;

use tracing::{error, info};

use crate::backend::RecordingBackend;
use crate::notify::{Notice, NoticeSender};

/// Ships chunks to the backend.
///
/// Scheduled chunks are fire-and-forget: each upload runs as its own task
/// so a slow or failing upload never blocks capture or later chunks. A
/// failed chunk is logged, surfaced as a transient notice, and abandoned;
/// it is never retried or re-buffered, so ordering can't be corrupted.
pub struct UploadPipeline {
    backend: Arc<dyn RecordingBackend>,
    notices: NoticeSender,
    content_type: String,
}

impl UploadPipeline {
    pub fn new(
        backend: Arc<dyn RecordingBackend>,
        notices: NoticeSender,
        content_type: String,
    ) -> Self {
        Self {
            backend,
            notices,
            content_type,
        }
    }

    /// Submit a chunk without waiting for the upload to complete.
    pub fn submit(&self, session_id: String, chunk_index: u64, payload: Vec<u8>) {
        let backend = Arc::clone(&self.backend);
        let notices = self.notices.clone();
        let content_type = self.content_type.clone();
        tokio::spawn(async move {
            upload_one(&*backend, &notices, &content_type, session_id, chunk_index, payload)
                .await;
        });
    }

    /// Submit the final chunk at stop time and wait for the attempt to
    /// finish. Failure is still non-fatal: the chunk is abandoned.
    pub async fn submit_final(&self, session_id: String, chunk_index: u64, payload: Vec<u8>) {
        upload_one(
            &*self.backend,
            &self.notices,
            &self.content_type,
            session_id,
            chunk_index,
            payload,
        )
        .await;
    }
}

async fn upload_one(
    backend: &dyn RecordingBackend,
    notices: &NoticeSender,
    content_type: &str,
    session_id: String,
    chunk_index: u64,
    payload: Vec<u8>,
) {
    let bytes = payload.len();
    match backend
        .upload_chunk(&session_id, chunk_index, payload, content_type)
        .await
    {
        Ok(()) => {
            info!(session_id = %session_id, chunk_index, bytes, "chunk uploaded");
        }
        Err(e) => {
            error!(session_id = %session_id, chunk_index, bytes, "chunk upload failed: {e}");
            let _ = notices.send(Notice::ChunkUploadFailed {
                chunk_index,
                detail: e.to_string(),
            });
        }
    }
}
