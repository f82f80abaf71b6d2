//! Latest-wins hand-off between the receive task and consumers.
//!
//! The receive path owns a [`SharedState`] and is its only writer. Every
//! mutation goes through one `watch::Sender::send_modify`, which holds the
//! channel's write lock for the whole update; readers clone the value out
//! under the read lock. A reader therefore always sees a [`Snapshot`]
//! produced by a sequence of whole mutations, never a half-written one.
//!
//! No history is kept. Readers keep working after the writer is gone and
//! keep returning the last published value.

use bytes::Bytes;
use tokio::sync::watch;

use crate::pose::Pose;
use crate::reassembly::CompletedFrame;

// ── Snapshot ─────────────────────────────────────────────────────

/// The latest frame and pose as one value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Most recent completed frame, if any has completed yet.
    pub frame: Option<CompletedFrame>,
    pub pose: Pose,
    /// Incremented by every mutation; 0 means nothing was published.
    pub revision: u64,
    /// Frames published so far.
    pub frames: u64,
    /// Pose updates published so far.
    pub poses: u64,
}

impl Snapshot {
    /// Frame bytes, empty before the first frame completes.
    pub fn frame_bytes(&self) -> Bytes {
        self.frame
            .as_ref()
            .map(|f| f.data.clone())
            .unwrap_or_default()
    }
}

// ── SharedState ──────────────────────────────────────────────────

/// Writer side.
#[derive(Debug)]
pub struct SharedState {
    tx: watch::Sender<Snapshot>,
}

impl SharedState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Snapshot::default());
        Self { tx }
    }

    /// Replace the latest frame.
    pub fn publish_frame(&self, frame: CompletedFrame) {
        self.tx.send_modify(|snap| {
            snap.frame = Some(frame);
            snap.frames += 1;
            snap.revision += 1;
        });
    }

    /// Replace the latest pose.
    pub fn publish_pose(&self, pose: Pose) {
        self.tx.send_modify(|snap| {
            snap.pose = pose;
            snap.poses += 1;
            snap.revision += 1;
        });
    }

    pub fn snapshot(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    /// A new reader positioned at the current revision.
    pub fn reader(&self) -> StateReader {
        let rx = self.tx.subscribe();
        let last_seen = rx.borrow().revision;
        StateReader { rx, last_seen }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

// ── StateReader ──────────────────────────────────────────────────

/// Reader side. Cheap to clone; every clone tracks its own position.
#[derive(Debug, Clone)]
pub struct StateReader {
    rx: watch::Receiver<Snapshot>,
    last_seen: u64,
}

impl StateReader {
    /// The whole current value. Never blocks on the receive path.
    pub fn snapshot(&self) -> Snapshot {
        self.rx.borrow().clone()
    }

    /// Latest frame bytes, empty if no frame has completed.
    pub fn latest_frame_bytes(&self) -> Bytes {
        self.rx.borrow().frame_bytes()
    }

    pub fn latest_pose(&self) -> Pose {
        self.rx.borrow().pose
    }

    /// The current value if it changed since the last call, else `None`.
    pub fn next_update(&mut self) -> Option<Snapshot> {
        let snap = self.snapshot();
        if snap.revision == self.last_seen {
            return None;
        }
        self.last_seen = snap.revision;
        Some(snap)
    }

    /// Wait for the next mutation. Returns `false` once the writer is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

// ── Tests ────────────────────────────────────────────────────────
