//! The receive task and its owning handle.
//!
//! ```text
//! DatagramSource ──► ReceiveLoop ──┬──► FrameReassembler ──┐
//!                                  └──► PoseDecoder ───────┴──► SharedState ──► StateReader
//! ```
//!
//! [`ReceiveLoop`] runs as one Tokio task and owns all reassembly and pose
//! state, so none of it needs a lock. Its only suspension point is the
//! source receive, bounded by the socket timeout and by the in-flight
//! frame's deadline. [`Receiver`] is the handle the rest of the program
//! holds: it reads the shared state and shuts the task down.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::CamrxError;
use crate::packet::{MIN_DATAGRAM, Packet, ProtocolVariant};
use crate::pose::{Pose, PoseDecoder};
use crate::reassembly::{ChunkOutcome, FrameReassembler, HeaderOutcome};
use crate::source::{DatagramSource, Received, UdpSource};
use crate::state::{SharedState, Snapshot, StateReader};

/// Largest UDP payload over IPv4.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Shortest wait handed to the source, so a frame at its deadline does not
/// spin the loop.
const MIN_WAIT: Duration = Duration::from_millis(1);

// ── ReceiverConfig ───────────────────────────────────────────────

/// Configuration for [`Receiver`].
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// UDP port to bind on all interfaces. 0 picks an ephemeral port.
    pub port: u16,
    /// Longest single wait on the socket before re-checking shutdown.
    pub socket_timeout: Duration,
    /// How long a frame may collect chunks before it is abandoned.
    pub frame_timeout: Duration,
    /// How long [`Receiver::stop`] waits for the task to finish.
    pub join_timeout: Duration,
    /// Receive buffer size; longer datagrams are truncated.
    pub max_datagram_size: usize,
    pub variant: ProtocolVariant,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            port: 7400,
            socket_timeout: Duration::from_millis(100),
            frame_timeout: Duration::from_millis(250),
            join_timeout: Duration::from_millis(500),
            max_datagram_size: MAX_UDP_PAYLOAD,
            variant: ProtocolVariant::Calibrated,
        }
    }
}

impl ReceiverConfig {
    /// Config for `port` with the given socket and frame timeouts.
    pub fn new(port: u16, socket_timeout_ms: u64, frame_timeout_ms: u64) -> Self {
        Self {
            port,
            socket_timeout: Duration::from_millis(socket_timeout_ms),
            frame_timeout: Duration::from_millis(frame_timeout_ms),
            ..Self::default()
        }
    }

    pub fn with_variant(mut self, variant: ProtocolVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn validate(&self) -> Result<(), CamrxError> {
        if self.socket_timeout.is_zero() {
            return Err(CamrxError::InvalidConfig("socket timeout must be non-zero".into()));
        }
        if self.frame_timeout.is_zero() {
            return Err(CamrxError::InvalidConfig("frame timeout must be non-zero".into()));
        }
        if self.max_datagram_size < MIN_DATAGRAM {
            return Err(CamrxError::InvalidConfig(format!(
                "max datagram size {} is below the {MIN_DATAGRAM}-byte minimum",
                self.max_datagram_size
            )));
        }
        Ok(())
    }
}

// ── ReceiverStats ────────────────────────────────────────────────

/// Counters maintained by the receive task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub datagrams: u64,
    /// Unrecognised, malformed or non-finite datagrams.
    pub dropped: u64,
    pub frames_completed: u64,
    /// Ran out of time or failed the completeness check.
    pub frames_abandoned: u64,
    /// Replaced by a newer header before completing.
    pub frames_superseded: u64,
    pub pose_updates: u64,
}

// ── ReceiveLoop ──────────────────────────────────────────────────

/// The receive task body.
pub struct ReceiveLoop<S> {
    source: S,
    reassembler: FrameReassembler,
    poses: PoseDecoder,
    state: SharedState,
    stats_tx: watch::Sender<ReceiverStats>,
    shutdown: CancellationToken,
    socket_timeout: Duration,
    variant: ProtocolVariant,
    buf: Vec<u8>,
}

impl<S: DatagramSource> ReceiveLoop<S> {
    pub fn new(
        source: S,
        config: &ReceiverConfig,
        state: SharedState,
        stats_tx: watch::Sender<ReceiverStats>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            reassembler: FrameReassembler::new(config.frame_timeout),
            poses: PoseDecoder::new(config.variant),
            state,
            stats_tx,
            shutdown,
            socket_timeout: config.socket_timeout,
            variant: config.variant,
            buf: vec![0u8; config.max_datagram_size],
        }
    }

    /// Run until the shutdown token fires or the source fails.
    pub async fn run(mut self) {
        info!(variant = %self.variant, "receive loop started");
        let mut buf = std::mem::take(&mut self.buf);

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let now = Instant::now();
            self.expire(now);
            let wait = match self.reassembler.remaining(now) {
                Some(left) => left.clamp(MIN_WAIT, self.socket_timeout.max(MIN_WAIT)),
                None => self.socket_timeout,
            };

            let received = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                r = self.source.recv(&mut buf, wait) => r,
            };

            match received {
                Ok(Received::Datagram(len)) => self.dispatch(&buf[..len], Instant::now()),
                Ok(Received::Timeout) => continue,
                Err(e) => {
                    if self.shutdown.is_cancelled() || matches!(e, CamrxError::SourceClosed) {
                        debug!("datagram source closed: {e}");
                    } else {
                        warn!("receive failed, stopping receive loop: {e}");
                    }
                    break;
                }
            }
        }

        if let Some(frame_id) = self.reassembler.reset() {
            debug!(frame_id, "dropping in-flight frame on shutdown");
        }
        info!("receive loop stopped");
    }

    /// Route one datagram to the reassembler or the pose decoder.
    pub fn dispatch(&mut self, data: &[u8], now: Instant) {
        self.bump(|s| s.datagrams += 1);
        self.expire(now);

        let Some(packet) = Packet::classify(data, self.variant) else {
            debug!(len = data.len(), "dropping unrecognised datagram");
            self.bump(|s| s.dropped += 1);
            return;
        };
        trace!(kind = packet.kind(), len = data.len(), "datagram");

        match packet {
            Packet::FrameHeader(header) => match self.reassembler.on_header(header, now) {
                HeaderOutcome::Started => {
                    trace!(frame_id = header.frame_id, expected = header.expected, "collecting frame");
                }
                HeaderOutcome::Superseded { abandoned } => {
                    debug!(abandoned, next = header.frame_id, "frame superseded by new header");
                    self.bump(|s| s.frames_superseded += 1);
                }
                HeaderOutcome::Ignored { abandoned } => {
                    debug!(
                        frame_id = header.frame_id,
                        expected = header.expected,
                        "ignoring header with non-positive chunk count"
                    );
                    if abandoned.is_some() {
                        self.bump(|s| s.frames_superseded += 1);
                    }
                }
            },
            Packet::Chunk(chunk) => match self.reassembler.on_chunk(chunk, now) {
                ChunkOutcome::Completed(frame) => {
                    debug!(frame_id = frame.frame_id, bytes = frame.data.len(), "frame complete");
                    self.state.publish_frame(frame);
                    self.bump(|s| s.frames_completed += 1);
                }
                ChunkOutcome::Discarded { frame_id } => {
                    debug!(frame_id, "frame failed completeness check");
                    self.bump(|s| s.frames_abandoned += 1);
                }
                ChunkOutcome::Duplicate => {
                    trace!(frame_id = chunk.frame_id, seq = chunk.seq, "duplicate chunk");
                }
                ChunkOutcome::Ignored => {
                    trace!(frame_id = chunk.frame_id, seq = chunk.seq, "stray chunk");
                }
                ChunkOutcome::Stored => {}
            },
            control => match self.poses.apply(&control) {
                Some(pose) => {
                    self.state.publish_pose(pose);
                    self.bump(|s| s.pose_updates += 1);
                }
                None => self.bump(|s| s.dropped += 1),
            },
        }
    }

    fn expire(&mut self, now: Instant) {
        if let Some(frame_id) = self.reassembler.expire(now) {
            debug!(frame_id, "frame timed out incomplete");
            self.bump(|s| s.frames_abandoned += 1);
        }
    }

    fn bump(&self, f: impl FnOnce(&mut ReceiverStats)) {
        self.stats_tx.send_modify(f);
    }
}

// ── Receiver ─────────────────────────────────────────────────────

/// Handle to a running receive task.
///
/// Getters never block on the receive path and keep returning the last
/// published values after the task has stopped.
pub struct Receiver {
    reader: StateReader,
    stats_rx: watch::Receiver<ReceiverStats>,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
    join_timeout: Duration,
    local_addr: Option<SocketAddr>,
}

impl Receiver {
    /// Bind `0.0.0.0:config.port` and spawn the receive task.
    pub async fn start(config: ReceiverConfig) -> Result<Self, CamrxError> {
        config.validate()?;
        let source = UdpSource::bind(config.port).await?;
        let addr = source.local_addr()?;
        info!(%addr, protocol = %config.variant, "listening for camera stream");

        let mut receiver = Self::with_source(source, config)?;
        receiver.local_addr = Some(addr);
        Ok(receiver)
    }

    /// Spawn the receive task over an arbitrary source.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_source<S>(source: S, config: ReceiverConfig) -> Result<Self, CamrxError>
    where
        S: DatagramSource + 'static,
    {
        config.validate()?;
        let state = SharedState::new();
        let reader = state.reader();
        let (stats_tx, stats_rx) = watch::channel(ReceiverStats::default());
        let shutdown = CancellationToken::new();

        let task = ReceiveLoop::new(source, &config, state, stats_tx, shutdown.clone());
        let handle = tokio::spawn(task.run());

        Ok(Self {
            reader,
            stats_rx,
            shutdown,
            handle: Some(handle),
            join_timeout: config.join_timeout,
            local_addr: None,
        })
    }

    /// Latest completed frame bytes, empty before the first frame.
    pub fn latest_frame_bytes(&self) -> Bytes {
        self.reader.latest_frame_bytes()
    }

    pub fn latest_pose(&self) -> Pose {
        self.reader.latest_pose()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.reader.snapshot()
    }

    /// A reader for a consumer task.
    pub fn reader(&self) -> StateReader {
        self.reader.clone()
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats_rx.borrow().clone()
    }

    /// Bound address, when started with [`Receiver::start`].
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Whether the receive task is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal shutdown and wait up to the join timeout for the task.
    ///
    /// Idempotent. If the task does not finish in time it is aborted and
    /// shutdown carries on.
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        let Some(handle) = self.handle.take() else {
            return;
        };

        let abort = handle.abort_handle();
        match tokio::time::timeout(self.join_timeout, handle).await {
            Ok(Ok(())) => debug!("receive task joined"),
            Ok(Err(e)) => warn!("receive task ended abnormally: {e}"),
            Err(_) => {
                warn!(timeout = ?self.join_timeout, "receive task did not stop in time; aborting");
                abort.abort();
            }
        }
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ── Tests ────────────────────────────────────────────────────────
