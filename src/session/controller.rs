use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{error, info, warn};

use super::buffer::ChunkBuffer;
use super::config::SessionConfig;
use super::state::{SessionSnapshot, SessionStatus};
use super::uploader::UploadPipeline;
use crate::audio::{CaptureSource, Fragment};
use crate::backend::RecordingBackend;
use crate::error::SessionError;
use crate::notify::{self, Notice, NoticeReceiver, NoticeSender};

const ELAPSED_TICK: Duration = Duration::from_secs(1);

enum Command {
    Start(oneshot::Sender<Result<(), SessionError>>),
    Pause(oneshot::Sender<Result<(), SessionError>>),
    Resume(oneshot::Sender<Result<(), SessionError>>),
    Stop(oneshot::Sender<Result<(), SessionError>>),
}

/// Cheap handle to a running [`SessionController`].
///
/// All operations are delivered to the controller's event loop and
/// processed one at a time, so duplicate user input (double-start,
/// double-stop) resolves to an [`SessionError::InvalidState`] rejection
/// rather than a race.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub async fn start(&self) -> Result<(), SessionError> {
        self.send(Command::Start).await
    }

    pub async fn pause(&self) -> Result<(), SessionError> {
        self.send(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<(), SessionError> {
        self.send(Command::Resume).await
    }

    pub async fn stop(&self) -> Result<(), SessionError> {
        self.send(Command::Stop).await
    }

    /// Current session state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch channel carrying every state/elapsed-time change.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    async fn send(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<(), SessionError>>) -> Command,
    ) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)?
    }
}

/// The recording session state machine.
///
/// Owns the capture source, the chunk buffer, the chunk index and both
/// timers, and is the single source of truth for "is recording active".
/// Runs as one event loop: commands, fragment arrivals and timer ticks are
/// discrete events, each processed to completion before the next, which is
/// what makes the buffer swap and index assignment atomic without locks.
pub struct SessionController {
    backend: Arc<dyn RecordingBackend>,
    capture: Box<dyn CaptureSource>,
    config: SessionConfig,
    uploader: UploadPipeline,
    notices: NoticeSender,
    commands: mpsc::Receiver<Command>,
    snapshot: watch::Sender<SessionSnapshot>,

    status: SessionStatus,
    session_id: Option<String>,
    elapsed_secs: u64,
    next_chunk_index: u64,
    buffer: ChunkBuffer,
    fragments: Option<mpsc::Receiver<Fragment>>,
    chunk_timer: Option<Interval>,
    elapsed_timer: Option<Interval>,
}

impl SessionController {
    /// Spawn the controller event loop; returns the command handle and the
    /// stream of user-facing notices.
    pub fn spawn(
        backend: Arc<dyn RecordingBackend>,
        capture: Box<dyn CaptureSource>,
        config: SessionConfig,
    ) -> (SessionHandle, NoticeReceiver) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (notice_tx, notice_rx) = notify::channel();
        let (snap_tx, snap_rx) = watch::channel(SessionSnapshot::default());

        let uploader = UploadPipeline::new(
            Arc::clone(&backend),
            notice_tx.clone(),
            config.content_type.clone(),
        );

        let controller = SessionController {
            backend,
            capture,
            config,
            uploader,
            notices: notice_tx,
            commands: cmd_rx,
            snapshot: snap_tx,
            status: SessionStatus::Idle,
            session_id: None,
            elapsed_secs: 0,
            next_chunk_index: 0,
            buffer: ChunkBuffer::new(),
            fragments: None,
            chunk_timer: None,
            elapsed_timer: None,
        };
        tokio::spawn(controller.run());

        (
            SessionHandle {
                commands: cmd_tx,
                snapshot: snap_rx,
            },
            notice_rx,
        )
    }

    async fn run(mut self) {
        loop {
            // Biased: fragments and due timer ticks drain before a command
            // at the same instant, so a pause or stop never swallows a
            // tick that already fired.
            tokio::select! {
                biased;
                fragment = next_fragment(&mut self.fragments) => match fragment {
                    Some(fragment) => self.buffer.push(fragment),
                    None => self.fragments = None,
                },
                _ = maybe_tick(&mut self.chunk_timer) => self.on_chunk_tick(),
                _ = maybe_tick(&mut self.elapsed_timer) => self.on_elapsed_tick(),
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    // Every handle is gone.
                    None => break,
                },
            }
        }

        if self.status != SessionStatus::Idle {
            warn!("controller dropped mid-session, releasing capture");
            if let Err(e) = self.capture.release().await {
                warn!("capture release failed: {e}");
            }
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start(reply) => {
                let _ = reply.send(self.do_start().await);
            }
            Command::Pause(reply) => {
                let _ = reply.send(self.do_pause().await);
            }
            Command::Resume(reply) => {
                let _ = reply.send(self.do_resume());
            }
            Command::Stop(reply) => {
                let _ = reply.send(self.do_stop().await);
            }
        }
    }

    async fn do_start(&mut self) -> Result<(), SessionError> {
        if self.status != SessionStatus::Idle {
            warn!(status = %self.status, "ignoring start outside idle");
            return Err(SessionError::InvalidState {
                op: "start",
                status: self.status,
            });
        }

        let recording = self
            .backend
            .create_recording()
            .await
            .map_err(SessionError::SessionCreation)?;

        let fragments = self
            .capture
            .acquire()
            .await
            .map_err(SessionError::CaptureAcquisition)?;

        info!(session_id = %recording.id, source = self.capture.name(), "recording started");

        self.session_id = Some(recording.id);
        self.status = SessionStatus::Recording;
        self.elapsed_secs = 0;
        self.next_chunk_index = 0;
        self.buffer.clear();
        self.fragments = Some(fragments);
        self.elapsed_timer = Some(delayed_interval(ELAPSED_TICK));
        self.chunk_timer = Some(delayed_interval(self.config.chunk_interval));
        self.publish();
        Ok(())
    }

    async fn do_pause(&mut self) -> Result<(), SessionError> {
        if self.status != SessionStatus::Recording {
            warn!(status = %self.status, "ignoring pause outside recording");
            return Err(SessionError::InvalidState {
                op: "pause",
                status: self.status,
            });
        }

        self.capture.suspend();
        self.elapsed_timer = None;
        // The chunk timer keeps ticking so the cadence stays regular
        // across resume; its ticks are no-ops while suspended.

        self.status = SessionStatus::Paused;
        self.publish();

        if let Some(id) = self.session_id.clone() {
            if let Err(e) = self.backend.pause_recording(&id).await {
                warn!(session_id = %id, "pause notification failed: {e}");
                let _ = self.notices.send(Notice::PauseNotifyFailed {
                    detail: e.to_string(),
                });
            }
        }

        info!("recording paused");
        Ok(())
    }

    fn do_resume(&mut self) -> Result<(), SessionError> {
        if self.status != SessionStatus::Paused {
            warn!(status = %self.status, "ignoring resume outside paused");
            return Err(SessionError::InvalidState {
                op: "resume",
                status: self.status,
            });
        }

        self.capture.resume();
        self.elapsed_timer = Some(delayed_interval(ELAPSED_TICK));
        self.status = SessionStatus::Recording;
        self.publish();
        info!("recording resumed");
        Ok(())
    }

    async fn do_stop(&mut self) -> Result<(), SessionError> {
        if !matches!(
            self.status,
            SessionStatus::Recording | SessionStatus::Paused
        ) {
            warn!(status = %self.status, "ignoring stop outside recording/paused");
            return Err(SessionError::InvalidState {
                op: "stop",
                status: self.status,
            });
        }

        self.status = SessionStatus::Stopping;
        self.publish();

        // Cancel both timers before the final flush so no further tick can
        // interleave with the final chunk's construction.
        self.chunk_timer = None;
        self.elapsed_timer = None;

        // No new audio once stopping has begun.
        self.capture.suspend();

        // Fragments already queued by the capture source belong to this
        // session; fold them into the final chunk.
        if let Some(rx) = &mut self.fragments {
            while let Ok(fragment) = rx.try_recv() {
                self.buffer.push(fragment);
            }
        }

        // Recording/Paused always carry a backend id.
        let Some(session_id) = self.session_id.clone() else {
            self.reset_idle();
            return Ok(());
        };

        if !self.buffer.is_empty() {
            let chunk_index = self.next_chunk_index;
            self.next_chunk_index += 1;
            let payload = self.buffer.take();
            self.uploader
                .submit_final(session_id.clone(), chunk_index, payload)
                .await;
        }

        if let Err(e) = self.capture.release().await {
            warn!("capture release failed: {e}");
        }
        self.fragments = None;

        let finish = self.backend.finish_recording(&session_id).await;

        // Local cleanup completes whether or not finish succeeded.
        self.reset_idle();

        match finish {
            Ok(()) => {
                info!(session_id = %session_id, "recording finished");
                Ok(())
            }
            Err(e) => {
                error!(session_id = %session_id, "finish notification failed: {e}");
                let _ = self.notices.send(Notice::FinishFailed {
                    detail: e.to_string(),
                });
                Err(SessionError::Finish(e))
            }
        }
    }

    /// Scheduler tick: swap the buffer, assign the next index and hand the
    /// chunk to the pipeline, all before yielding.
    fn on_chunk_tick(&mut self) {
        if self.buffer.is_empty() || !self.capture.is_capturing() {
            return;
        }
        let Some(session_id) = self.session_id.clone() else {
            return;
        };
        let chunk_index = self.next_chunk_index;
        self.next_chunk_index += 1;
        let fragments = self.buffer.fragment_count();
        let payload = self.buffer.take();
        info!(session_id = %session_id, chunk_index, fragments, "flushing chunk");
        self.uploader.submit(session_id, chunk_index, payload);
    }

    fn on_elapsed_tick(&mut self) {
        if self.status == SessionStatus::Recording {
            self.elapsed_secs += 1;
            self.publish();
        }
    }

    fn reset_idle(&mut self) {
        self.status = SessionStatus::Idle;
        self.session_id = None;
        self.elapsed_secs = 0;
        self.next_chunk_index = 0;
        self.buffer.clear();
        self.fragments = None;
        self.chunk_timer = None;
        self.elapsed_timer = None;
        self.publish();
    }

    fn publish(&self) {
        self.snapshot.send_replace(SessionSnapshot {
            status: self.status,
            elapsed_secs: self.elapsed_secs,
            session_id: self.session_id.clone(),
        });
    }
}

/// First fire one full period out, then on every period boundary.
fn delayed_interval(period: Duration) -> Interval {
    let mut interval = time::interval_at(time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn maybe_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn next_fragment(rx: &mut Option<mpsc::Receiver<Fragment>>) -> Option<Fragment> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
