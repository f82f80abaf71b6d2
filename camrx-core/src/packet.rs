//! Datagram classification and packet encoding.
//!
//! One protocol message per UDP datagram. The receiver tells packets apart
//! by total length and a leading format tag:
//!
//! ```text
//! Frame header   format(u32=1) | frame_id(u32) | expected(i32)            12 B
//! Frame chunk    format(u32=1) | frame_id(u32) | seq(u32) | payload      >12 B
//!
//! Calibrated variant
//!   Axis         format(u32=2) | 9×f32 basis | f32 vertical fov           44 B
//!   Extrinsics   format(u32=3) | 9×f32 rotation | 3×f32 translation(cm)  52 B
//!
//! PositionOnly variant
//!   Position     format(u32=2) | 3×f64 position(cm)                       28 B
//! ```
//!
//! Matrices are sent row-major. Anything else is dropped.

use serde::{Deserialize, Serialize};

use crate::error::CamrxError;
use crate::wire;

// ── Constants ────────────────────────────────────────────────────

/// Format tag shared by frame headers and chunks.
pub const FORMAT_FRAME: u32 = 1;
/// Axis/intrinsics packet (calibrated) or position packet (position-only).
pub const FORMAT_CONTROL: u32 = 2;
/// Extrinsics packet (calibrated only).
pub const FORMAT_EXTRINSICS: u32 = 3;

/// Smallest datagram worth looking at: `format | frame_id | seq`.
pub const MIN_DATAGRAM: usize = 12;

// ── ProtocolVariant ──────────────────────────────────────────────

/// Which control-packet family the sender speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolVariant {
    /// Axis/intrinsics + extrinsics packets (12/44/52 byte datagrams).
    #[default]
    Calibrated,
    /// Standalone position packets (12/28 byte datagrams).
    PositionOnly,
}

impl std::fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Calibrated => write!(f, "calibrated"),
            Self::PositionOnly => write!(f, "position-only"),
        }
    }
}

// ── FrameHeader ──────────────────────────────────────────────────

/// Announces a new frame and how many chunks make it up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_id: u32,
    /// Signed on the wire; non-positive counts are ignored by the reassembler.
    pub expected: i32,
}

impl FrameHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 12;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        wire::put_u32(&mut buf, FORMAT_FRAME);
        wire::put_u32(&mut buf, self.frame_id);
        wire::put_i32(&mut buf, self.expected);
        buf
    }

    fn decode(data: &[u8]) -> Result<Self, CamrxError> {
        Ok(Self {
            frame_id: wire::read_u32(data, 4)?,
            expected: wire::read_i32(data, 8)?,
        })
    }
}

// ── Chunk ────────────────────────────────────────────────────────

/// One fragment of a frame, borrowing its payload from the datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub frame_id: u32,
    pub seq: u32,
    pub payload: &'a [u8],
}

impl<'a> Chunk<'a> {
    /// Size of the chunk header preceding the payload.
    pub const HEADER_SIZE: usize = 12;

    pub fn encode(frame_id: u32, seq: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::HEADER_SIZE + payload.len());
        wire::put_u32(&mut buf, FORMAT_FRAME);
        wire::put_u32(&mut buf, frame_id);
        wire::put_u32(&mut buf, seq);
        buf.extend_from_slice(payload);
        buf
    }

    fn decode(data: &'a [u8]) -> Result<Self, CamrxError> {
        Ok(Self {
            frame_id: wire::read_u32(data, 4)?,
            seq: wire::read_u32(data, 8)?,
            payload: &data[Self::HEADER_SIZE..],
        })
    }
}

// ── Control packets ──────────────────────────────────────────────

/// Device axis basis and vertical field of view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisPacket {
    /// Row-major 3×3 basis.
    pub basis: [f32; 9],
    pub vertical_fov: f32,
}

impl AxisPacket {
    pub const SIZE: usize = 44;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        wire::put_u32(&mut buf, FORMAT_CONTROL);
        for v in self.basis {
            wire::put_f32(&mut buf, v);
        }
        wire::put_f32(&mut buf, self.vertical_fov);
        buf
    }

    fn decode(data: &[u8]) -> Result<Self, CamrxError> {
        Ok(Self {
            basis: wire::read_f32_array(data, 4)?,
            vertical_fov: wire::read_f32(data, 40)?,
        })
    }
}

/// Camera rotation plus translation in centimeters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtrinsicsPacket {
    /// Row-major 3×3 rotation.
    pub rotation: [f32; 9],
    pub translation_cm: [f32; 3],
}

impl ExtrinsicsPacket {
    pub const SIZE: usize = 52;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        wire::put_u32(&mut buf, FORMAT_EXTRINSICS);
        for v in self.rotation.iter().chain(self.translation_cm.iter()) {
            wire::put_f32(&mut buf, *v);
        }
        buf
    }

    fn decode(data: &[u8]) -> Result<Self, CamrxError> {
        Ok(Self {
            rotation: wire::read_f32_array(data, 4)?,
            translation_cm: wire::read_f32_array(data, 40)?,
        })
    }
}

/// Camera position in centimeters, double precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionPacket {
    pub position_cm: [f64; 3],
}

impl PositionPacket {
    pub const SIZE: usize = 28;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        wire::put_u32(&mut buf, FORMAT_CONTROL);
        for v in self.position_cm {
            wire::put_f64(&mut buf, v);
        }
        buf
    }

    fn decode(data: &[u8]) -> Result<Self, CamrxError> {
        Ok(Self {
            position_cm: [
                wire::read_f64(data, 4)?,
                wire::read_f64(data, 12)?,
                wire::read_f64(data, 20)?,
            ],
        })
    }
}

// ── Packet ───────────────────────────────────────────────────────

/// A classified datagram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Packet<'a> {
    FrameHeader(FrameHeader),
    Chunk(Chunk<'a>),
    Axis(AxisPacket),
    Extrinsics(ExtrinsicsPacket),
    Position(PositionPacket),
}

impl<'a> Packet<'a> {
    /// Classify a datagram for the given protocol variant.
    ///
    /// Returns `None` for anything too short, with an unknown tag, or whose
    /// length does not match the fixed size its tag requires.
    pub fn classify(data: &'a [u8], variant: ProtocolVariant) -> Option<Self> {
        if data.len() < MIN_DATAGRAM {
            return None;
        }
        let format = wire::read_u32(data, 0).ok()?;
        let len = data.len();

        let parsed = match (format, variant) {
            (FORMAT_FRAME, _) if len == FrameHeader::SIZE => {
                FrameHeader::decode(data).map(Packet::FrameHeader)
            }
            (FORMAT_FRAME, _) => Chunk::decode(data).map(Packet::Chunk),
            (FORMAT_CONTROL, ProtocolVariant::Calibrated) if len == AxisPacket::SIZE => {
                AxisPacket::decode(data).map(Packet::Axis)
            }
            (FORMAT_EXTRINSICS, ProtocolVariant::Calibrated) if len == ExtrinsicsPacket::SIZE => {
                ExtrinsicsPacket::decode(data).map(Packet::Extrinsics)
            }
            (FORMAT_CONTROL, ProtocolVariant::PositionOnly) if len == PositionPacket::SIZE => {
                PositionPacket::decode(data).map(Packet::Position)
            }
            _ => return None,
        };
        parsed.ok()
    }

    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FrameHeader(_) => "frame-header",
            Self::Chunk(_) => "chunk",
            Self::Axis(_) => "axis",
            Self::Extrinsics(_) => "extrinsics",
            Self::Position(_) => "position",
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
