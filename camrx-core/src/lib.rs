//! # camrx-core
//!
//! Receiver library for a UDP camera stream: chunked image frames plus
//! camera pose control packets, reassembled on a background task and handed
//! to a display consumer through a latest-wins snapshot.
//!
//! This crate contains:
//! - **Wire**: big-endian field readers and writers (`wire`)
//! - **Packets**: datagram layouts and classification (`Packet`, `ProtocolVariant`)
//! - **Sources**: `DatagramSource` over UDP or in-memory feeds
//! - **Reassembly**: `FrameReassembler`, one in-flight frame with a deadline
//! - **Pose**: `PoseDecoder` and the sender-to-display change of basis
//! - **State**: `SharedState` / `StateReader`, atomic latest-value hand-off
//! - **Receiver**: `Receiver`, the receive task and its lifecycle
//! - **Sinks**: `FrameSink`, `PoseSink` and the polling `Consumer`
//! - **Sender**: `FrameSender`, the transmit side for demos and tests
//! - **Error**: `CamrxError`, a `thiserror`-based error type

pub mod error;
pub mod packet;
pub mod pose;
pub mod reassembly;
pub mod receiver;
pub mod sender;
pub mod sink;
pub mod source;
pub mod state;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use error::CamrxError;
pub use packet::{
    AxisPacket, Chunk, ExtrinsicsPacket, FrameHeader, Packet, PositionPacket, ProtocolVariant,
};
pub use pose::{CoordinateTransform, HANDEDNESS_FLIP, Pose, PoseDecoder};
pub use reassembly::{CompletedFrame, FrameReassembler};
pub use receiver::{MAX_UDP_PAYLOAD, Receiver, ReceiverConfig, ReceiverStats};
pub use sender::FrameSender;
pub use sink::{Consumer, Delivered, FrameSink, PoseSink};
pub use source::{DatagramSource, MemoryFeed, MemorySource, Received, UdpSource};
pub use state::{SharedState, Snapshot, StateReader};
