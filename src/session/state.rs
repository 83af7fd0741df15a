use std::fmt;

/// Session lifecycle states.
///
/// `Idle → Recording → (Paused ⇄ Recording) → Stopping → Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Recording,
    Paused,
    /// Final flush and backend finish are in progress.
    Stopping,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Recording => "recording",
            SessionStatus::Paused => "paused",
            SessionStatus::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Read-only view of the controller's session state, published on a watch
/// channel for the UI and the waveform sampler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub elapsed_secs: u64,
    /// Backend-issued identifier, present while a session is live.
    pub session_id: Option<String>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            status: SessionStatus::Idle,
            elapsed_secs: 0,
            session_id: None,
        }
    }
}

/// Render elapsed seconds as `HH:MM:SS`.
pub fn format_elapsed(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
