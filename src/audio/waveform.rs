//! Live waveform sampling.
//!
//! Pull-based bridge between the capture source's amplitude feed and a
//! renderer: a lazy, infinite sequence of fixed-size frames that only
//! yields while the session is recording. Pausing the session simply makes
//! the sampler wait; it terminates once the capture source or the session
//! controller is gone.

use std::time::Duration;

use futures::Stream;
use tokio::sync::watch;
use tokio::time::{interval, Interval, MissedTickBehavior};

use super::source::{AmplitudeTap, SampleFrame};
use crate::session::{SessionSnapshot, SessionStatus};

pub struct WaveformSampler {
    tap: AmplitudeTap,
    session: watch::Receiver<SessionSnapshot>,
    ticker: Interval,
}

impl WaveformSampler {
    /// `cadence` is the render cadence, typically one display frame.
    pub fn new(
        tap: AmplitudeTap,
        session: watch::Receiver<SessionSnapshot>,
        cadence: Duration,
    ) -> Self {
        let mut ticker = interval(cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            tap,
            session,
            ticker,
        }
    }

    /// Next amplitude frame. Waits while the session is not recording;
    /// returns `None` once the controller or the capture feed has shut
    /// down for good.
    pub async fn next_frame(&mut self) -> Option<SampleFrame> {
        loop {
            while self.session.borrow_and_update().status != SessionStatus::Recording {
                if self.session.changed().await.is_err() {
                    return None;
                }
            }

            self.ticker.tick().await;

            // The session may have left Recording while we waited out the
            // render cadence.
            if self.session.borrow().status != SessionStatus::Recording {
                continue;
            }

            return self.tap.frame();
        }
    }

    /// Adapt the sampler into a `futures::Stream` of frames.
    pub fn into_stream(self) -> impl Stream<Item = SampleFrame> {
        futures::stream::unfold(self, |mut sampler| async move {
            let frame = sampler.next_frame().await?;
            Some((frame, sampler))
        })
    }
}

/// Peak absolute amplitude of a frame, for simple meter-style rendering.
pub fn frame_peak(frame: &[f32]) -> f32 {
    frame.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
}
