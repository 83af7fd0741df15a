use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::error::CaptureError;

/// Smallest unit of captured audio: the PCM bytes collected over one
/// capture cadence (default 1 second).
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Raw PCM bytes (i16 little-endian, mono).
    pub bytes: Vec<u8>,
    /// Milliseconds since capture was acquired.
    pub timestamp_ms: u64,
}

/// One fixed-size frame of normalized amplitudes in -1.0..1.0, suitable
/// for drawing a waveform.
pub type SampleFrame = Vec<f32>;

/// Read side of the live amplitude feed. Pull-based: `frame()` returns
/// whatever the capture source most recently published.
#[derive(Clone)]
pub struct AmplitudeTap {
    rx: watch::Receiver<SampleFrame>,
}

impl AmplitudeTap {
    /// Latest amplitude frame, or `None` once the capture source is gone.
    pub fn frame(&self) -> Option<SampleFrame> {
        if self.rx.has_changed().is_err() {
            return None;
        }
        Some(self.rx.borrow().clone())
    }
}

/// Publisher/subscriber pair for the amplitude feed. The capture source
/// keeps the sender and replaces the frame on every hardware callback.
pub fn amplitude_channel(frame_size: usize) -> (watch::Sender<SampleFrame>, AmplitudeTap) {
    let (tx, rx) = watch::channel(vec![0.0; frame_size]);
    (tx, AmplitudeTap { rx })
}

/// A live audio capture source (microphone).
///
/// Exclusively owned by the session controller for the lifetime of one
/// session. Suspension must happen at the source: `suspend` flushes any
/// samples already captured as one last fragment on the channel, and no
/// further fragments are produced until `resume`.
#[async_trait]
pub trait CaptureSource: Send {
    /// Open the hardware stream and begin capturing. Fragments arrive on
    /// the returned channel on a fixed cadence.
    async fn acquire(&mut self) -> Result<mpsc::Receiver<Fragment>, CaptureError>;

    /// Stop accepting audio without releasing the hardware. Samples
    /// already captured are flushed onto the fragment channel first.
    fn suspend(&mut self);

    /// Start accepting audio again after [`suspend`](Self::suspend).
    fn resume(&mut self);

    /// Stop capturing and release the hardware stream.
    async fn release(&mut self) -> Result<(), CaptureError>;

    /// True while acquired and not suspended.
    fn is_capturing(&self) -> bool;

    /// Handle for the live waveform feed. Valid before `acquire`; frames
    /// only update while capturing.
    fn amplitude_tap(&self) -> AmplitudeTap;

    /// Source name for logging.
    fn name(&self) -> &str;
}
