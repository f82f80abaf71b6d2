//! Consumer side: pushing the latest state into display sinks.
//!
//! A [`Consumer`] polls a [`StateReader`] at its own cadence and hands new
//! values to a [`FrameSink`] and a [`PoseSink`]. It never touches the
//! receive path; a slow sink only means intermediate frames are skipped.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::CamrxError;
use crate::pose::Pose;
use crate::reassembly::CompletedFrame;
use crate::state::StateReader;

/// Receives completed frames, e.g. to upload as a texture.
pub trait FrameSink: Send {
    fn upload_frame(&mut self, frame: &CompletedFrame) -> Result<(), CamrxError>;
}

/// Receives pose updates, e.g. to drive a scene camera.
pub trait PoseSink: Send {
    fn apply_pose(&mut self, pose: &Pose) -> Result<(), CamrxError>;
}

impl<F> FrameSink for F
where
    F: FnMut(&CompletedFrame) -> Result<(), CamrxError> + Send,
{
    fn upload_frame(&mut self, frame: &CompletedFrame) -> Result<(), CamrxError> {
        self(frame)
    }
}

impl<F> PoseSink for F
where
    F: FnMut(&Pose) -> Result<(), CamrxError> + Send,
{
    fn apply_pose(&mut self, pose: &Pose) -> Result<(), CamrxError> {
        self(pose)
    }
}

/// What a [`Consumer::tick`] delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivered {
    pub frame: bool,
    pub pose: bool,
}

/// Polls shared state and forwards changes to the sinks.
pub struct Consumer<F, P> {
    reader: StateReader,
    frames: F,
    poses: P,
    frames_seen: u64,
    poses_seen: u64,
}

impl<F: FrameSink, P: PoseSink> Consumer<F, P> {
    pub fn new(reader: StateReader, frames: F, poses: P) -> Self {
        Self {
            reader,
            frames,
            poses,
            frames_seen: 0,
            poses_seen: 0,
        }
    }

    /// Deliver whatever changed since the previous tick.
    ///
    /// Sink errors are logged and do not stop later ticks.
    pub fn tick(&mut self) -> Delivered {
        let mut delivered = Delivered::default();
        let Some(snap) = self.reader.next_update() else {
            return delivered;
        };

        if snap.frames != self.frames_seen {
            self.frames_seen = snap.frames;
            if let Some(frame) = &snap.frame {
                match self.frames.upload_frame(frame) {
                    Ok(()) => delivered.frame = true,
                    Err(e) => warn!(frame_id = frame.frame_id, "frame sink failed: {e}"),
                }
            }
        }

        if snap.poses != self.poses_seen {
            self.poses_seen = snap.poses;
            match self.poses.apply_pose(&snap.pose) {
                Ok(()) => delivered.pose = true,
                Err(e) => warn!("pose sink failed: {e}"),
            }
        }

        delivered
    }

    /// Tick every `period` until `shutdown` fires.
    pub async fn run(mut self, period: Duration, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(?period, "consumer started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }
        debug!("consumer stopped");
    }
}

// ── Tests ────────────────────────────────────────────────────────
