//! User-facing notification events.
//!
//! Mid-session failures never change the session state machine; they are
//! reported here instead so a UI can surface them. Transient notices are
//! dismissible; blocking notices require acknowledgment.

use tokio::sync::mpsc;

/// How a notice should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Dismissible toast-style message.
    Transient,
    /// Requires acknowledgment before the UI moves on.
    Blocking,
}

/// A user-visible event emitted by the session controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A chunk upload failed; the chunk was abandoned, recording continues.
    ChunkUploadFailed { chunk_index: u64, detail: String },
    /// The backend pause notification failed; the local pause still holds.
    PauseNotifyFailed { detail: String },
    /// The finish call failed; downstream transcription did not start.
    FinishFailed { detail: String },
}

impl Notice {
    pub fn severity(&self) -> Severity {
        match self {
            Notice::ChunkUploadFailed { .. } | Notice::PauseNotifyFailed { .. } => {
                Severity::Transient
            }
            Notice::FinishFailed { .. } => Severity::Blocking,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Notice::ChunkUploadFailed {
                chunk_index,
                detail,
            } => format!("failed to upload audio chunk {chunk_index}: {detail}"),
            Notice::PauseNotifyFailed { detail } => {
                format!("could not notify backend of pause: {detail}")
            }
            Notice::FinishFailed { detail } => {
                format!("failed to finish recording: {detail}")
            }
        }
    }
}

pub type NoticeSender = mpsc::UnboundedSender<Notice>;
pub type NoticeReceiver = mpsc::UnboundedReceiver<Notice>;

pub fn channel() -> (NoticeSender, NoticeReceiver) {
    mpsc::unbounded_channel()
}
