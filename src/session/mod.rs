//! Recording session lifecycle.
//!
//! This module owns the session state machine and its coordination work:
//! - `controller`: the event loop driving start/pause/resume/stop,
//!   fragment collection, the chunk scheduler and the elapsed-time timer
//! - `buffer`: pending not-yet-uploaded audio
//! - `uploader`: fire-and-forget chunk shipping to the backend
//! - `state`: status/snapshot types and elapsed-time formatting

mod buffer;
mod config;
mod controller;
mod state;
mod uploader;

pub use buffer::ChunkBuffer;
pub use config::SessionConfig;
pub use controller::{SessionController, SessionHandle};
pub use state::{format_elapsed, SessionSnapshot, SessionStatus};
pub use uploader::UploadPipeline;
