use thiserror::Error;

use crate::session::SessionStatus;

/// Errors returned by the recording backend service.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport-level failure after the connection was made (TLS, body
    /// decode, protocol errors).
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status code.
    #[error("backend rejected request with status {status}")]
    Status { status: u16 },

    /// The backend could not be reached at all.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the capture source (microphone acquisition and streaming).
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no audio input device available")]
    NoDevice,

    /// Opening or starting the input stream failed (includes denied
    /// microphone access on platforms that report it this way).
    #[error("failed to open capture stream: {0}")]
    Stream(String),

    /// The source was already released, or its worker went away.
    #[error("capture source is closed")]
    Closed,
}

/// Errors surfaced by session controller operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The backend refused to create a new recording; the controller
    /// stays idle and holds no resources.
    #[error("could not create recording session: {0}")]
    SessionCreation(#[source] BackendError),

    /// The microphone could not be acquired; the controller stays idle.
    #[error("could not acquire microphone: {0}")]
    CaptureAcquisition(#[source] CaptureError),

    /// The finish notification failed. Local cleanup has already
    /// completed; the backend can recover the session by retrying.
    #[error("failed to finish recording: {0}")]
    Finish(#[source] BackendError),

    /// Operation called outside its valid source state; state unchanged.
    #[error("{op} is not valid while the session is {status}")]
    InvalidState {
        op: &'static str,
        status: SessionStatus,
    },

    #[error("session controller has shut down")]
    Closed,
}
