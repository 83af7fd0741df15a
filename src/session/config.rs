use std::time::Duration;

/// Tunables for one recording session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often buffered fragments are flushed into an uploaded chunk.
    pub chunk_interval: Duration,

    /// Content type sent with each chunk upload.
    pub content_type: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_interval: Duration::from_secs(20),
            content_type: "audio/pcm".to_string(),
        }
    }
}
