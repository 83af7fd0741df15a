pub mod audio;
pub mod backend;
pub mod config;
pub mod error;
pub mod notify;
pub mod session;

pub use audio::{
    AmplitudeTap, CaptureSource, Fragment, MicCapture, MicConfig, SampleFrame, WaveformSampler,
};
pub use backend::{HttpBackend, Recording, RecordingBackend, RecordingStatus};
pub use config::Config;
pub use error::{BackendError, CaptureError, SessionError};
pub use notify::{Notice, NoticeReceiver, Severity};
pub use session::{
    format_elapsed, SessionConfig, SessionController, SessionHandle, SessionSnapshot,
    SessionStatus,
};
