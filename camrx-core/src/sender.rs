//! Sending side of the camera stream.
//!
//! Used by the viewer's loopback demo and the integration tests. A frame is
//! sent as one header datagram followed by its chunks, each at most `mtu`
//! bytes so it crosses the link without IP fragmentation.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use tokio::net::UdpSocket;
use tracing::trace;

use crate::error::CamrxError;
use crate::packet::{AxisPacket, Chunk, ExtrinsicsPacket, FrameHeader, PositionPacket};

/// Maximum transmission unit minus IP (20) + UDP (8) headers.
pub const DEFAULT_MTU: usize = 1400;

/// UDP sender for frames and control packets.
pub struct FrameSender {
    socket: UdpSocket,
    remote_addr: SocketAddr,
    next_frame_id: AtomicU32,
    mtu: usize,
    bytes_sent: AtomicU64,
}

impl FrameSender {
    /// Wrap an already-bound `UdpSocket` targeting `remote_addr`.
    pub fn new(socket: UdpSocket, remote_addr: SocketAddr) -> Self {
        Self {
            socket,
            remote_addr,
            next_frame_id: AtomicU32::new(0),
            mtu: DEFAULT_MTU,
            bytes_sent: AtomicU64::new(0),
        }
    }

    /// Bind an ephemeral local port and target `remote_addr`.
    pub async fn connect(remote_addr: SocketAddr) -> Result<Self, CamrxError> {
        let local: SocketAddr = if remote_addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        Ok(Self::new(socket, remote_addr))
    }

    /// Override the datagram size limit. Clamped so every chunk carries at
    /// least one payload byte.
    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu.max(Chunk::HEADER_SIZE + 1);
        self
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Total bytes sent across all datagrams.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Send `data` under the next frame id. Returns the id used.
    pub async fn send_frame(&self, data: &[u8]) -> Result<u32, CamrxError> {
        let frame_id = self.next_frame_id.fetch_add(1, Ordering::SeqCst);
        self.send_frame_with_id(frame_id, data).await?;
        Ok(frame_id)
    }

    /// Send `data` as frame `frame_id`: header first, then chunks in order.
    pub async fn send_frame_with_id(&self, frame_id: u32, data: &[u8]) -> Result<(), CamrxError> {
        if data.is_empty() {
            return Err("cannot send an empty frame".into());
        }
        let chunks: Vec<&[u8]> = data.chunks(self.mtu - Chunk::HEADER_SIZE).collect();
        let expected = i32::try_from(chunks.len())
            .map_err(|_| format!("frame needs {} chunks", chunks.len()))?;

        self.send_raw(&FrameHeader { frame_id, expected }.encode()).await?;
        for (seq, payload) in chunks.into_iter().enumerate() {
            self.send_raw(&Chunk::encode(frame_id, seq as u32, payload)).await?;
        }
        trace!(frame_id, expected, bytes = data.len(), "frame sent");
        Ok(())
    }

    pub async fn send_axis(&self, packet: &AxisPacket) -> Result<(), CamrxError> {
        self.send_raw(&packet.encode()).await
    }

    pub async fn send_extrinsics(&self, packet: &ExtrinsicsPacket) -> Result<(), CamrxError> {
        self.send_raw(&packet.encode()).await
    }

    pub async fn send_position(&self, packet: &PositionPacket) -> Result<(), CamrxError> {
        self.send_raw(&packet.encode()).await
    }

    /// Send one datagram as-is.
    pub async fn send_raw(&self, datagram: &[u8]) -> Result<(), CamrxError> {
        let sent = self.socket.send_to(datagram, self.remote_addr).await?;
        self.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
