//! Frame reassembly state machine.
//!
//! ```text
//!             header(N > 0)
//!   Idle ──────────────────────► Collecting(frame_id, expected, chunks)
//!    ▲                               │   │   │
//!    │        all chunks present     │   │   │ new header: abandon,
//!    ├───────────── Complete ◄───────┘   │   │ start over (or Idle if N ≤ 0)
//!    │                                   │   └──────────────┐
//!    └───────────── Abandoned ◄──────────┘ deadline passed  ▼
//! ```
//!
//! Only one frame is ever in flight. A header always wins over the frame
//! being collected; stragglers from older frames and foreign traffic are
//! ignored. Incomplete frames are dropped at the deadline and never
//! published, so memory is bounded by one frame's chunks.
//!
//! Time is passed in by the caller so the machine can be driven by a fake
//! clock in tests; the receive loop uses [`Instant::now`].

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::packet::{Chunk, FrameHeader};

// ── CompletedFrame ───────────────────────────────────────────────

/// A fully reassembled frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompletedFrame {
    pub frame_id: u32,
    /// Chunk payloads concatenated in ascending sequence order.
    pub data: Bytes,
}

// ── InFlightFrame ────────────────────────────────────────────────

/// The frame currently being collected.
#[derive(Debug)]
struct InFlightFrame {
    frame_id: u32,
    expected: u32,
    chunks: BTreeMap<u32, Bytes>,
    started: Instant,
}

impl InFlightFrame {
    fn is_full(&self) -> bool {
        self.chunks.len() == self.expected as usize
    }

    /// Concatenate in seq order, or `None` if any seq in `0..expected` is
    /// missing.
    fn assemble(self) -> Option<CompletedFrame> {
        if !(0..self.expected).all(|seq| self.chunks.contains_key(&seq)) {
            return None;
        }
        let total: usize = self.chunks.values().map(Bytes::len).sum();
        let mut data = BytesMut::with_capacity(total);
        for payload in self.chunks.values() {
            data.extend_from_slice(payload);
        }
        Some(CompletedFrame {
            frame_id: self.frame_id,
            data: data.freeze(),
        })
    }
}

// ── Outcomes ─────────────────────────────────────────────────────

/// What a header did to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderOutcome {
    /// Collection started; nothing was in flight.
    Started,
    /// Collection restarted; the frame with this id was abandoned.
    Superseded { abandoned: u32 },
    /// Non-positive chunk count. Any in-flight frame was abandoned.
    Ignored { abandoned: Option<u32> },
}

/// What a chunk did to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Stored; the frame still needs more chunks.
    Stored,
    /// Seq already present; nothing changed.
    Duplicate,
    /// Not for the in-flight frame (or nothing is in flight).
    Ignored,
    /// Last missing chunk arrived.
    Completed(CompletedFrame),
    /// The frame filled up but failed the completeness check and was dropped.
    Discarded { frame_id: u32 },
}

// ── FrameReassembler ─────────────────────────────────────────────

#[derive(Debug, Default)]
enum ReassemblyState {
    #[default]
    Idle,
    Collecting(InFlightFrame),
}

/// Collects chunks of one frame at a time.
#[derive(Debug)]
pub struct FrameReassembler {
    state: ReassemblyState,
    timeout: Duration,
}

impl FrameReassembler {
    /// Create an idle reassembler that abandons frames older than `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: ReassemblyState::Idle,
            timeout,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, ReassemblyState::Idle)
    }

    /// Id of the frame being collected, if any.
    pub fn in_flight(&self) -> Option<u32> {
        match &self.state {
            ReassemblyState::Collecting(frame) => Some(frame.frame_id),
            ReassemblyState::Idle => None,
        }
    }

    /// Time left before the in-flight frame is abandoned.
    ///
    /// `None` when idle. Zero once the deadline has passed.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match &self.state {
            ReassemblyState::Collecting(frame) => Some(
                self.timeout
                    .saturating_sub(now.saturating_duration_since(frame.started)),
            ),
            ReassemblyState::Idle => None,
        }
    }

    /// Abandon the in-flight frame if it has been collecting for longer
    /// than the timeout. Returns the abandoned frame id.
    pub fn expire(&mut self, now: Instant) -> Option<u32> {
        let expired = match &self.state {
            ReassemblyState::Collecting(frame) => {
                now.saturating_duration_since(frame.started) > self.timeout
            }
            ReassemblyState::Idle => false,
        };
        if expired { self.take_in_flight() } else { None }
    }

    /// Apply a frame header.
    pub fn on_header(&mut self, header: FrameHeader, now: Instant) -> HeaderOutcome {
        self.expire(now);
        let abandoned = self.take_in_flight();

        if header.expected <= 0 {
            return HeaderOutcome::Ignored { abandoned };
        }

        self.state = ReassemblyState::Collecting(InFlightFrame {
            frame_id: header.frame_id,
            expected: header.expected as u32,
            chunks: BTreeMap::new(),
            started: now,
        });

        match abandoned {
            Some(abandoned) => HeaderOutcome::Superseded { abandoned },
            None => HeaderOutcome::Started,
        }
    }

    /// Apply a frame chunk.
    pub fn on_chunk(&mut self, chunk: Chunk<'_>, now: Instant) -> ChunkOutcome {
        self.expire(now);

        let frame = match &mut self.state {
            ReassemblyState::Collecting(frame) if frame.frame_id == chunk.frame_id => frame,
            _ => return ChunkOutcome::Ignored,
        };

        if chunk.seq >= frame.expected {
            return ChunkOutcome::Ignored;
        }
        if frame.chunks.contains_key(&chunk.seq) {
            return ChunkOutcome::Duplicate;
        }
        frame
            .chunks
            .insert(chunk.seq, Bytes::copy_from_slice(chunk.payload));

        if !frame.is_full() {
            return ChunkOutcome::Stored;
        }

        let ReassemblyState::Collecting(frame) = std::mem::take(&mut self.state) else {
            return ChunkOutcome::Ignored;
        };
        let frame_id = frame.frame_id;
        match frame.assemble() {
            Some(done) => ChunkOutcome::Completed(done),
            None => ChunkOutcome::Discarded { frame_id },
        }
    }

    /// Drop whatever is in flight and go idle.
    pub fn reset(&mut self) -> Option<u32> {
        self.take_in_flight()
    }

    fn take_in_flight(&mut self) -> Option<u32> {
        match std::mem::take(&mut self.state) {
            ReassemblyState::Collecting(frame) => Some(frame.frame_id),
            ReassemblyState::Idle => None,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
