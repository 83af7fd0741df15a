use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::source::{amplitude_channel, AmplitudeTap, CaptureSource, Fragment, SampleFrame};
use crate::error::CaptureError;

/// Capture tuning for the microphone source.
#[derive(Debug, Clone)]
pub struct MicConfig {
    /// How much audio to collect per fragment.
    pub fragment_interval: Duration,
    /// Samples per amplitude frame published for the waveform.
    pub frame_size: usize,
}

impl Default for MicConfig {
    fn default() -> Self {
        Self {
            fragment_interval: Duration::from_secs(1),
            frame_size: 128,
        }
    }
}

#[derive(Default)]
struct Shared {
    capturing: AtomicBool,
    suspended: AtomicBool,
}

/// Microphone capture via cpal.
///
/// The cpal stream is not `Send`, so a dedicated OS thread owns it for the
/// lifetime of the acquisition; the hardware callback feeds a shared sample
/// buffer that an async pump drains into fragments on a fixed cadence.
pub struct MicCapture {
    config: MicConfig,
    shared: Arc<Shared>,
    pending: Arc<Mutex<Vec<i16>>>,
    amp_tx: Arc<watch::Sender<SampleFrame>>,
    tap: AmplitudeTap,
    frag_tx: Option<mpsc::Sender<Fragment>>,
    started: Option<Instant>,
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    pump: Option<JoinHandle<()>>,
}

impl MicCapture {
    pub fn new(config: MicConfig) -> Self {
        let (amp_tx, tap) = amplitude_channel(config.frame_size);
        Self {
            config,
            shared: Arc::new(Shared::default()),
            pending: Arc::new(Mutex::new(Vec::new())),
            amp_tx: Arc::new(amp_tx),
            tap,
            frag_tx: None,
            started: None,
            stop_tx: None,
            pump: None,
        }
    }

    /// Turn whatever is sitting in `pending` into one last fragment, right
    /// now. Called on suspend and release so the tail of the audio reaches
    /// the session before the controller drains the channel.
    fn flush_pending(&mut self) {
        let Some(frag_tx) = &self.frag_tx else {
            return;
        };
        let samples = match self.pending.lock() {
            Ok(mut p) => std::mem::take(&mut *p),
            Err(_) => return,
        };
        if samples.is_empty() {
            return;
        }
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let timestamp_ms = self
            .started
            .map(|s| s.elapsed().as_millis() as u64)
            .unwrap_or_default();
        if frag_tx.try_send(Fragment { bytes, timestamp_ms }).is_err() {
            warn!("fragment channel closed or full, dropping tail samples");
        }
    }
}

/// State moved into the hardware callback.
#[derive(Clone)]
struct CallbackState {
    shared: Arc<Shared>,
    pending: Arc<Mutex<Vec<i16>>>,
    amp_tx: Arc<watch::Sender<SampleFrame>>,
    frame_size: usize,
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    state: CallbackState,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    let mut window: Vec<f32> = Vec::with_capacity(state.frame_size);

    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            // Suspension happens here: a paused session produces nothing.
            if state.shared.suspended.load(Ordering::SeqCst)
                || !state.shared.capturing.load(Ordering::SeqCst)
            {
                return;
            }

            let Ok(mut pending) = state.pending.lock() else {
                return;
            };
            for frame in data.chunks(channels) {
                let mut acc = 0.0f32;
                for &s in frame {
                    acc += f32::from_sample(s);
                }
                let mono = (acc / channels as f32).clamp(-1.0, 1.0);
                pending.push((mono * i16::MAX as f32) as i16);
                window.push(mono);
            }
            drop(pending);

            if window.len() >= state.frame_size {
                let start = window.len() - state.frame_size;
                state.amp_tx.send_replace(window[start..].to_vec());
                window.clear();
            }
        },
        |e| error!("capture stream error: {e}"),
        None,
    )
}

#[async_trait]
impl CaptureSource for MicCapture {
    async fn acquire(&mut self) -> Result<mpsc::Receiver<Fragment>, CaptureError> {
        if self.stop_tx.is_some() {
            return Err(CaptureError::Stream("capture already acquired".into()));
        }

        self.pending.lock().map(|mut p| p.clear()).ok();
        self.shared.suspended.store(false, Ordering::SeqCst);

        let (ready_tx, ready_rx) = oneshot::channel::<Result<u32, CaptureError>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let state = CallbackState {
            shared: Arc::clone(&self.shared),
            pending: Arc::clone(&self.pending),
            amp_tx: Arc::clone(&self.amp_tx),
            frame_size: self.config.frame_size,
        };

        std::thread::spawn(move || {
            let host = cpal::default_host();
            let Some(device) = host.default_input_device() else {
                let _ = ready_tx.send(Err(CaptureError::NoDevice));
                return;
            };
            let supported = match device.default_input_config() {
                Ok(c) => c,
                Err(e) => {
                    let _ = ready_tx.send(Err(CaptureError::Stream(e.to_string())));
                    return;
                }
            };
            let sample_format = supported.sample_format();
            let config: cpal::StreamConfig = supported.config();

            let stream = match sample_format {
                cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, state),
                cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, state),
                cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, state),
                other => {
                    let _ = ready_tx.send(Err(CaptureError::Stream(format!(
                        "unsupported sample format {other:?}"
                    ))));
                    return;
                }
            };
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(CaptureError::Stream(e.to_string())));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(CaptureError::Stream(e.to_string())));
                return;
            }

            let _ = ready_tx.send(Ok(config.sample_rate.0));

            // Hold the stream until release.
            let _ = stop_rx.recv();
            drop(stream);
        });

        let sample_rate = ready_rx.await.map_err(|_| CaptureError::Closed)??;
        info!(sample_rate, "microphone acquired");

        self.shared.capturing.store(true, Ordering::SeqCst);
        self.stop_tx = Some(stop_tx);

        let (frag_tx, frag_rx) = mpsc::channel::<Fragment>(32);
        let shared = Arc::clone(&self.shared);
        let pending = Arc::clone(&self.pending);
        let interval = self.config.fragment_interval;
        let started = Instant::now();
        self.frag_tx = Some(frag_tx.clone());
        self.started = Some(started);

        self.pump = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !shared.capturing.load(Ordering::SeqCst) {
                    break;
                }
                // suspend() already flushed the tail; anything that lands
                // in `pending` afterwards waits for resume.
                if shared.suspended.load(Ordering::SeqCst) {
                    continue;
                }
                let samples = match pending.lock() {
                    Ok(mut p) => std::mem::take(&mut *p),
                    Err(_) => break,
                };
                if samples.is_empty() {
                    continue;
                }
                let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
                let fragment = Fragment {
                    bytes,
                    timestamp_ms: started.elapsed().as_millis() as u64,
                };
                if frag_tx.send(fragment).await.is_err() {
                    break;
                }
            }
        }));

        Ok(frag_rx)
    }

    fn suspend(&mut self) {
        self.shared.suspended.store(true, Ordering::SeqCst);
        self.flush_pending();
    }

    fn resume(&mut self) {
        self.shared.suspended.store(false, Ordering::SeqCst);
    }

    async fn release(&mut self) -> Result<(), CaptureError> {
        if self.stop_tx.is_none() {
            return Ok(());
        }
        self.shared.capturing.store(false, Ordering::SeqCst);
        self.flush_pending();
        self.shared.suspended.store(false, Ordering::SeqCst);
        if let Some(stop_tx) = self.stop_tx.take() {
            if stop_tx.send(()).is_err() {
                warn!("capture worker already gone at release");
            }
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.frag_tx = None;
        self.started = None;
        info!("microphone released");
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.shared.capturing.load(Ordering::SeqCst)
            && !self.shared.suspended.load(Ordering::SeqCst)
    }

    fn amplitude_tap(&self) -> AmplitudeTap {
        self.tap.clone()
    }

    fn name(&self) -> &str {
        "microphone"
    }
}


impl Drop for MicCapture {
    fn drop(&mut self) {
        self.shared.capturing.store(false, Ordering::SeqCst);
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}
