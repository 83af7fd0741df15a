// Integration tests for the session controller state machine.
//
// These run on a paused tokio clock: `sleep` drives the virtual clock, so
// the 20-second chunk scheduler and the 1-second elapsed timer fire
// deterministically without real waiting. Audio comes from a scripted
// capture source; uploads land in an in-memory mock backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;

use memovox::audio::{amplitude_channel, AmplitudeTap, CaptureSource, Fragment, SampleFrame};
use memovox::backend::{Recording, RecordingBackend, RecordingStatus};
use memovox::error::{BackendError, CaptureError, SessionError};
use memovox::notify::{Notice, NoticeReceiver};
use memovox::session::{SessionConfig, SessionController, SessionHandle, SessionStatus};

// ---- scripted capture source ----------------------------------------------

#[derive(Default)]
struct ScriptedInner {
    capturing: AtomicBool,
    suspended: AtomicBool,
    tx: Mutex<Option<mpsc::Sender<Fragment>>>,
    pending: Mutex<Vec<u8>>,
    emitted: AtomicUsize,
}

impl ScriptedInner {
    fn send(&self, bytes: Vec<u8>) -> bool {
        let guard = self.tx.lock().unwrap();
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        let n = self.emitted.fetch_add(1, Ordering::SeqCst);
        tx.try_send(Fragment {
            bytes,
            timestamp_ms: n as u64 * 1000,
        })
        .is_ok()
    }
}

/// Test-side handle for feeding audio into a `ScriptedCapture`.
#[derive(Clone)]
struct CaptureDriver {
    inner: Arc<ScriptedInner>,
}

impl CaptureDriver {
    /// Emit one fragment, mirroring hardware behavior: nothing is
    /// delivered while released or suspended. Returns whether the
    /// fragment was actually produced.
    fn emit(&self, bytes: &[u8]) -> bool {
        if !self.inner.capturing.load(Ordering::SeqCst)
            || self.inner.suspended.load(Ordering::SeqCst)
        {
            return false;
        }
        self.inner.send(bytes.to_vec())
    }

    /// Audio the hardware has captured but not yet delivered as a
    /// fragment. The source flushes it when suspended, like the real one.
    fn stage(&self, bytes: &[u8]) {
        if !self.inner.capturing.load(Ordering::SeqCst)
            || self.inner.suspended.load(Ordering::SeqCst)
        {
            return;
        }
        self.inner.pending.lock().unwrap().extend_from_slice(bytes);
    }

    fn acquired(&self) -> bool {
        self.inner.capturing.load(Ordering::SeqCst)
    }
}

struct ScriptedCapture {
    inner: Arc<ScriptedInner>,
    tap: AmplitudeTap,
    _amp_tx: watch::Sender<SampleFrame>,
    fail_acquire: bool,
}

impl ScriptedCapture {
    fn new() -> (Self, CaptureDriver) {
        let inner = Arc::new(ScriptedInner::default());
        let (amp_tx, tap) = amplitude_channel(4);
        let driver = CaptureDriver {
            inner: Arc::clone(&inner),
        };
        (
            Self {
                inner,
                tap,
                _amp_tx: amp_tx,
                fail_acquire: false,
            },
            driver,
        )
    }

    fn failing() -> (Self, CaptureDriver) {
        let (mut capture, driver) = Self::new();
        capture.fail_acquire = true;
        (capture, driver)
    }
}

#[async_trait]
impl CaptureSource for ScriptedCapture {
    async fn acquire(&mut self) -> Result<mpsc::Receiver<Fragment>, CaptureError> {
        if self.fail_acquire {
            return Err(CaptureError::NoDevice);
        }
        let (tx, rx) = mpsc::channel(256);
        *self.inner.tx.lock().unwrap() = Some(tx);
        self.inner.suspended.store(false, Ordering::SeqCst);
        self.inner.capturing.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    fn suspend(&mut self) {
        self.inner.suspended.store(true, Ordering::SeqCst);
        let tail = std::mem::take(&mut *self.inner.pending.lock().unwrap());
        if !tail.is_empty() {
            self.inner.send(tail);
        }
    }

    fn resume(&mut self) {
        self.inner.suspended.store(false, Ordering::SeqCst);
    }

    async fn release(&mut self) -> Result<(), CaptureError> {
        self.inner.capturing.store(false, Ordering::SeqCst);
        *self.inner.tx.lock().unwrap() = None;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.inner.capturing.load(Ordering::SeqCst)
            && !self.inner.suspended.load(Ordering::SeqCst)
    }

    fn amplitude_tap(&self) -> AmplitudeTap {
        self.tap.clone()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ---- mock backend ---------------------------------------------------------

#[derive(Default)]
struct MockBackend {
    /// (recording id, chunk index, payload) recorded when the call starts.
    attempts: Mutex<Vec<(String, u64, Vec<u8>)>>,
    /// Chunk indices in completion order (successful uploads only).
    completions: Mutex<Vec<u64>>,
    upload_failures: Mutex<Vec<u64>>,
    upload_delays: Mutex<HashMap<u64, Duration>>,
    created: AtomicUsize,
    pause_calls: AtomicUsize,
    finish_calls: AtomicUsize,
    fail_create: AtomicBool,
    fail_pause: AtomicBool,
    fail_finish: AtomicBool,
}

impl MockBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn attempts(&self) -> Vec<(String, u64, Vec<u8>)> {
        self.attempts.lock().unwrap().clone()
    }

    fn attempted_indices(&self) -> Vec<u64> {
        self.attempts().iter().map(|(_, i, _)| *i).collect()
    }

    fn completions(&self) -> Vec<u64> {
        self.completions.lock().unwrap().clone()
    }

    /// All uploaded bytes, concatenated in chunk-index order.
    fn payload_in_index_order(&self) -> Vec<u8> {
        let mut attempts = self.attempts();
        attempts.sort_by_key(|(_, i, _)| *i);
        attempts.into_iter().flat_map(|(_, _, p)| p).collect()
    }

    fn fail_upload(&self, chunk_index: u64) {
        self.upload_failures.lock().unwrap().push(chunk_index);
    }

    fn delay_upload(&self, chunk_index: u64, delay: Duration) {
        self.upload_delays.lock().unwrap().insert(chunk_index, delay);
    }

    fn recording(id: String) -> Recording {
        Recording {
            id,
            status: RecordingStatus::Active,
            created_at: None,
            updated_at: None,
            transcription_text: None,
            notes: None,
            chunks_count: 0,
        }
    }
}

#[async_trait]
impl RecordingBackend for MockBackend {
    async fn create_recording(&self) -> Result<Recording, BackendError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("create refused".into()));
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Self::recording(format!("rec-{n}")))
    }

    async fn upload_chunk(
        &self,
        recording_id: &str,
        chunk_index: u64,
        payload: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), BackendError> {
        self.attempts
            .lock()
            .unwrap()
            .push((recording_id.to_string(), chunk_index, payload));

        let delay = self.upload_delays.lock().unwrap().get(&chunk_index).copied();
        if let Some(delay) = delay {
            sleep(delay).await;
        }

        if self.upload_failures.lock().unwrap().contains(&chunk_index) {
            return Err(BackendError::Unavailable("upload refused".into()));
        }
        self.completions.lock().unwrap().push(chunk_index);
        Ok(())
    }

    async fn pause_recording(&self, _recording_id: &str) -> Result<(), BackendError> {
        self.pause_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_pause.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("pause refused".into()));
        }
        Ok(())
    }

    async fn finish_recording(&self, _recording_id: &str) -> Result<(), BackendError> {
        self.finish_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_finish.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("finish refused".into()));
        }
        Ok(())
    }

    async fn update_notes(
        &self,
        recording_id: &str,
        _notes: &str,
    ) -> Result<Recording, BackendError> {
        Ok(Self::recording(recording_id.to_string()))
    }

    async fn list_recordings(&self) -> Result<Vec<Recording>, BackendError> {
        Ok(vec![])
    }

    async fn get_recording(&self, recording_id: &str) -> Result<Recording, BackendError> {
        Ok(Self::recording(recording_id.to_string()))
    }
}

// ---- helpers --------------------------------------------------------------

fn spawn_controller(
    backend: Arc<MockBackend>,
) -> (SessionHandle, NoticeReceiver, CaptureDriver) {
    let (capture, driver) = ScriptedCapture::new();
    let (handle, notices) =
        SessionController::spawn(backend, Box::new(capture), SessionConfig::default());
    (handle, notices, driver)
}

/// Emit one labelled fragment per virtual second, for `seconds` seconds.
async fn capture_seconds(driver: &CaptureDriver, labels: &mut Vec<Vec<u8>>, seconds: u64) {
    for _ in 0..seconds {
        let label = format!("frag-{:04};", labels.len()).into_bytes();
        if driver.emit(&label) {
            labels.push(label);
        }
        sleep(Duration::from_secs(1)).await;
    }
}

fn concat(labels: &[Vec<u8>]) -> Vec<u8> {
    labels.iter().flatten().copied().collect()
}

fn drain_notices(notices: &mut NoticeReceiver) -> Vec<Notice> {
    let mut out = Vec::new();
    while let Ok(n) = notices.try_recv() {
        out.push(n);
    }
    out
}

/// Let spawned upload tasks run to completion on the paused clock.
async fn settle() {
    sleep(Duration::from_millis(5)).await;
}

// ---- state machine validity -----------------------------------------------

#[tokio::test(start_paused = true)]
async fn operations_outside_valid_states_are_rejected() {
    let backend = MockBackend::new();
    let (handle, _notices, _driver) = spawn_controller(backend.clone());

    assert!(matches!(
        handle.pause().await,
        Err(SessionError::InvalidState { op: "pause", .. })
    ));
    assert!(matches!(
        handle.resume().await,
        Err(SessionError::InvalidState { op: "resume", .. })
    ));
    assert!(matches!(
        handle.stop().await,
        Err(SessionError::InvalidState { op: "stop", .. })
    ));
    assert_eq!(handle.snapshot().status, SessionStatus::Idle);

    handle.start().await.unwrap();
    assert!(matches!(
        handle.start().await,
        Err(SessionError::InvalidState { op: "start", .. })
    ));
    assert!(matches!(
        handle.resume().await,
        Err(SessionError::InvalidState { op: "resume", .. })
    ));
    // The rejects above did not disturb the live session.
    assert_eq!(handle.snapshot().status, SessionStatus::Recording);

    handle.pause().await.unwrap();
    assert!(matches!(
        handle.pause().await,
        Err(SessionError::InvalidState { op: "pause", .. })
    ));
    assert_eq!(handle.snapshot().status, SessionStatus::Paused);

    handle.stop().await.unwrap();
    assert_eq!(handle.snapshot().status, SessionStatus::Idle);
    // Only one backend session was ever created.
    assert_eq!(backend.created.load(Ordering::SeqCst), 1);
}

// ---- chunk sequencing -----------------------------------------------------

#[tokio::test(start_paused = true)]
async fn forty_five_seconds_yields_chunks_zero_one_two() {
    let backend = MockBackend::new();
    let (handle, _notices, driver) = spawn_controller(backend.clone());
    let mut labels = Vec::new();

    handle.start().await.unwrap();
    // Two scheduler ticks fire at 20s and 40s; ~5s remains buffered.
    capture_seconds(&driver, &mut labels, 45).await;
    handle.stop().await.unwrap();
    settle().await;

    assert_eq!(labels.len(), 45);
    let mut indices = backend.attempted_indices();
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 1, 2]);

    // Every fragment appears in exactly one chunk, in capture order.
    assert_eq!(backend.payload_in_index_order(), concat(&labels));
    assert_eq!(backend.finish_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_skips_final_flush_when_nothing_is_buffered() {
    let backend = MockBackend::new();
    let (handle, _notices, _driver) = spawn_controller(backend.clone());

    handle.start().await.unwrap();
    sleep(Duration::from_secs(5)).await;
    handle.stop().await.unwrap();
    settle().await;

    assert!(backend.attempts().is_empty());
    assert_eq!(backend.finish_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_flushes_buffered_audio_as_one_final_chunk() {
    let backend = MockBackend::new();
    let (handle, _notices, driver) = spawn_controller(backend.clone());
    let mut labels = Vec::new();

    handle.start().await.unwrap();
    capture_seconds(&driver, &mut labels, 3).await;
    handle.stop().await.unwrap();
    settle().await;

    let attempts = backend.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].1, 0);
    assert_eq!(attempts[0].2, concat(&labels));
}

#[tokio::test(start_paused = true)]
async fn stop_includes_audio_captured_after_the_last_fragment() {
    let backend = MockBackend::new();
    let (handle, _notices, driver) = spawn_controller(backend.clone());
    let mut labels = Vec::new();

    handle.start().await.unwrap();
    capture_seconds(&driver, &mut labels, 3).await;
    // Half a second of audio is still inside the source when stop lands;
    // the suspend that stop performs flushes it onto the channel in time
    // for the final chunk.
    driver.stage(b"tail;");
    handle.stop().await.unwrap();
    settle().await;

    labels.push(b"tail;".to_vec());
    let attempts = backend.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].1, 0);
    assert_eq!(attempts[0].2, concat(&labels));
}

#[tokio::test(start_paused = true)]
async fn indices_restart_at_zero_for_a_new_session() {
    let backend = MockBackend::new();
    let (handle, _notices, driver) = spawn_controller(backend.clone());
    let mut labels = Vec::new();

    handle.start().await.unwrap();
    capture_seconds(&driver, &mut labels, 2).await;
    handle.stop().await.unwrap();

    handle.start().await.unwrap();
    capture_seconds(&driver, &mut labels, 2).await;
    // Elapsed time restarted from zero along with the chunk index.
    let mut watch = handle.watch();
    let elapsed = watch
        .wait_for(|s| s.elapsed_secs == 2)
        .await
        .expect("controller alive")
        .elapsed_secs;
    assert_eq!(elapsed, 2);
    handle.stop().await.unwrap();
    settle().await;

    let attempts = backend.attempts();
    assert_eq!(attempts.len(), 2);
    assert_eq!((attempts[0].0.as_str(), attempts[0].1), ("rec-0", 0));
    assert_eq!((attempts[1].0.as_str(), attempts[1].1), ("rec-1", 0));
}

#[tokio::test(start_paused = true)]
async fn slow_upload_never_blocks_later_chunks() {
    let backend = MockBackend::new();
    backend.delay_upload(0, Duration::from_secs(30));
    let (handle, _notices, driver) = spawn_controller(backend.clone());
    let mut labels = Vec::new();

    handle.start().await.unwrap();
    capture_seconds(&driver, &mut labels, 25).await;
    // Chunk 0 (tick at 20s) is still in flight when stop flushes chunk 1.
    handle.stop().await.unwrap();

    assert_eq!(backend.completions(), vec![1]);
    sleep(Duration::from_secs(31)).await;
    assert_eq!(backend.completions(), vec![1, 0]);
    assert_eq!(backend.payload_in_index_order(), concat(&labels));
}

// ---- pause/resume ---------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn elapsed_time_freezes_while_paused() {
    let backend = MockBackend::new();
    let (handle, _notices, _driver) = spawn_controller(backend);

    handle.start().await.unwrap();
    sleep(Duration::from_secs(10)).await;
    handle.pause().await.unwrap();
    assert_eq!(handle.snapshot().elapsed_secs, 10);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(handle.snapshot().elapsed_secs, 10);

    handle.resume().await.unwrap();
    let mut watch = handle.watch();
    let status = watch
        .wait_for(|s| s.elapsed_secs == 25)
        .await
        .expect("controller alive")
        .status;
    assert_eq!(status, SessionStatus::Recording);

    handle.stop().await.unwrap();
    assert_eq!(handle.snapshot().elapsed_secs, 0);
}

#[tokio::test(start_paused = true)]
async fn no_audio_is_captured_while_paused() {
    let backend = MockBackend::new();
    let (handle, _notices, driver) = spawn_controller(backend.clone());
    let mut labels = Vec::new();

    handle.start().await.unwrap();
    capture_seconds(&driver, &mut labels, 3).await;

    handle.pause().await.unwrap();
    // The suspended source refuses these outright.
    assert!(!driver.emit(b"paused-audio"));
    sleep(Duration::from_secs(2)).await;

    handle.resume().await.unwrap();
    capture_seconds(&driver, &mut labels, 2).await;
    handle.stop().await.unwrap();
    settle().await;

    let payload = backend.payload_in_index_order();
    assert_eq!(payload, concat(&labels));
    assert!(!payload
        .windows(b"paused-audio".len())
        .any(|w| w == b"paused-audio"));
}

#[tokio::test(start_paused = true)]
async fn scheduler_tick_does_not_flush_while_paused() {
    let backend = MockBackend::new();
    let (handle, _notices, driver) = spawn_controller(backend.clone());
    let mut labels = Vec::new();

    handle.start().await.unwrap();
    capture_seconds(&driver, &mut labels, 10).await;
    handle.pause().await.unwrap();

    // A scheduler tick passes at 20s with a non-empty buffer; it must not
    // flush while the source is suspended.
    sleep(Duration::from_secs(15)).await;
    assert!(backend.attempts().is_empty());

    handle.resume().await.unwrap();
    capture_seconds(&driver, &mut labels, 2).await;
    // Next tick at 40s flushes everything buffered so far as chunk 0.
    sleep(Duration::from_secs(15)).await;
    settle().await;

    let attempts = backend.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].1, 0);
    assert_eq!(attempts[0].2, concat(&labels));

    handle.stop().await.unwrap();
    settle().await;
    // Buffer was empty at stop time, so no extra chunk.
    assert_eq!(backend.attempts().len(), 1);
    assert_eq!(backend.pause_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn pause_notification_failure_is_not_fatal() {
    let backend = MockBackend::new();
    backend.fail_pause.store(true, Ordering::SeqCst);
    let (handle, mut notices, _driver) = spawn_controller(backend.clone());

    handle.start().await.unwrap();
    handle.pause().await.unwrap();
    assert_eq!(handle.snapshot().status, SessionStatus::Paused);

    let noticed = drain_notices(&mut notices);
    assert!(noticed
        .iter()
        .any(|n| matches!(n, Notice::PauseNotifyFailed { .. })));

    handle.resume().await.unwrap();
    handle.stop().await.unwrap();
    assert_eq!(backend.finish_calls.load(Ordering::SeqCst), 1);
}

// ---- failure handling -----------------------------------------------------

#[tokio::test(start_paused = true)]
async fn failed_session_creation_leaves_controller_idle() {
    let backend = MockBackend::new();
    backend.fail_create.store(true, Ordering::SeqCst);
    let (handle, _notices, driver) = spawn_controller(backend.clone());

    assert!(matches!(
        handle.start().await,
        Err(SessionError::SessionCreation(_))
    ));
    assert_eq!(handle.snapshot().status, SessionStatus::Idle);
    assert!(!driver.acquired());

    // The failure is recoverable: a later start works.
    backend.fail_create.store(false, Ordering::SeqCst);
    handle.start().await.unwrap();
    assert_eq!(handle.snapshot().status, SessionStatus::Recording);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_capture_acquisition_leaves_controller_idle() {
    let backend = MockBackend::new();
    let (capture, driver) = ScriptedCapture::failing();
    let (handle, _notices) =
        SessionController::spawn(backend.clone(), Box::new(capture), SessionConfig::default());

    assert!(matches!(
        handle.start().await,
        Err(SessionError::CaptureAcquisition(CaptureError::NoDevice))
    ));
    assert_eq!(handle.snapshot().status, SessionStatus::Idle);
    assert!(!driver.acquired());
    assert_eq!(handle.snapshot().session_id, None);
}

#[tokio::test(start_paused = true)]
async fn chunk_upload_failure_does_not_disrupt_the_session() {
    let backend = MockBackend::new();
    backend.fail_upload(1);
    let (handle, mut notices, driver) = spawn_controller(backend.clone());
    let mut labels = Vec::new();

    handle.start().await.unwrap();
    capture_seconds(&driver, &mut labels, 45).await;
    handle.stop().await.unwrap();
    settle().await;

    // Chunk 1 was attempted and abandoned; 0 and 2 went through and the
    // sequence was never re-numbered.
    let mut indices = backend.attempted_indices();
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 1, 2]);
    let mut completed = backend.completions();
    completed.sort_unstable();
    assert_eq!(completed, vec![0, 2]);

    let noticed = drain_notices(&mut notices);
    assert!(noticed
        .iter()
        .any(|n| matches!(n, Notice::ChunkUploadFailed { chunk_index: 1, .. })));
    assert_eq!(backend.finish_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn finish_failure_still_completes_local_cleanup() {
    let backend = MockBackend::new();
    backend.fail_finish.store(true, Ordering::SeqCst);
    let (handle, mut notices, driver) = spawn_controller(backend.clone());
    let mut labels = Vec::new();

    handle.start().await.unwrap();
    capture_seconds(&driver, &mut labels, 3).await;

    assert!(matches!(
        handle.stop().await,
        Err(SessionError::Finish(_))
    ));
    settle().await;

    // Capture released, timers stopped, state reset, final chunk shipped.
    assert!(!driver.acquired());
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Idle);
    assert_eq!(snapshot.elapsed_secs, 0);
    assert_eq!(backend.attempts().len(), 1);

    let noticed = drain_notices(&mut notices);
    assert!(noticed
        .iter()
        .any(|n| matches!(n, Notice::FinishFailed { .. })));
}
