pub mod mic;
pub mod source;
pub mod waveform;

pub use mic::{MicCapture, MicConfig};
pub use source::{amplitude_channel, AmplitudeTap, CaptureSource, Fragment, SampleFrame};
pub use waveform::{frame_peak, WaveformSampler};
