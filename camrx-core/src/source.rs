//! Datagram sources for the receive loop.
//!
//! A [`DatagramSource`] performs exactly one bounded wait per call and
//! reports either a datagram or a timeout. Timeouts are routine: they give
//! the receive loop a chance to look at its shutdown token and the frame
//! deadline. Any error is fatal for the loop.
//!
//! - [`UdpSource`]: live operation on a bound UDP socket.
//! - [`MemorySource`]: datagrams pushed through a [`MemoryFeed`], for tests
//!   and replay.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::error::CamrxError;

/// Result of a single receive attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// A datagram of this many bytes was written to the buffer.
    Datagram(usize),
    /// Nothing arrived within the timeout.
    Timeout,
}

/// Trait for datagram sources.
#[async_trait]
pub trait DatagramSource: Send {
    /// Wait up to `timeout` for the next datagram and copy it into `buf`.
    ///
    /// # Returns
    /// - `Ok(Received::Datagram(len))` - bytes written to `buf[..len]`
    /// - `Ok(Received::Timeout)` - nothing arrived in time
    /// - `Err` - the source is unusable; the caller must stop
    async fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Received, CamrxError>;
}

// ── UdpSource ────────────────────────────────────────────────────

/// UDP socket source for live operation.
pub struct UdpSource {
    socket: UdpSocket,
}

impl UdpSource {
    /// Wrap an already-bound socket.
    pub fn new(socket: UdpSocket) -> Self {
        Self { socket }
    }

    /// Bind to `0.0.0.0:port`. Port 0 picks an ephemeral port.
    pub async fn bind(port: u16) -> Result<Self, CamrxError> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, CamrxError> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl DatagramSource for UdpSource {
    async fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Received, CamrxError> {
        match tokio::time::timeout(timeout, self.socket.recv_from(buf)).await {
            Ok(Ok((len, _peer))) => Ok(Received::Datagram(len)),
            Ok(Err(e)) => Err(CamrxError::Io(e)),
            Err(_elapsed) => Ok(Received::Timeout),
        }
    }
}

// ── MemorySource ─────────────────────────────────────────────────

/// In-memory source fed through a [`MemoryFeed`].
///
/// Datagrams longer than the receive buffer are truncated, as a UDP socket
/// would. Once every feed is dropped (or [`MemoryFeed::close`] is called
/// and the queue drained) the source reports [`CamrxError::SourceClosed`].
pub struct MemorySource {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Producer half of a [`MemorySource`].
#[derive(Clone)]
pub struct MemoryFeed {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl MemorySource {
    /// Create a connected feed/source pair.
    pub fn channel() -> (MemoryFeed, MemorySource) {
        let (tx, rx) = mpsc::unbounded_channel();
        (MemoryFeed { tx: Some(tx) }, MemorySource { rx })
    }

    /// A source preloaded with `datagrams` that closes once they are consumed.
    pub fn from_datagrams<I>(datagrams: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let (feed, source) = Self::channel();
        for d in datagrams {
            feed.push(d);
        }
        source
    }
}

impl MemoryFeed {
    /// Queue one datagram. Returns `false` if the source is gone.
    pub fn push(&self, datagram: Vec<u8>) -> bool {
        match &self.tx {
            Some(tx) => tx.send(datagram).is_ok(),
            None => false,
        }
    }

    /// Stop feeding from this handle.
    pub fn close(&mut self) {
        self.tx = None;
    }
}

#[async_trait]
impl DatagramSource for MemorySource {
    async fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Received, CamrxError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(datagram)) => {
                let len = datagram.len().min(buf.len());
                buf[..len].copy_from_slice(&datagram[..len]);
                Ok(Received::Datagram(len))
            }
            Ok(None) => Err(CamrxError::SourceClosed),
            Err(_elapsed) => Ok(Received::Timeout),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_source_yields_in_order() {
        let mut source = MemorySource::from_datagrams(vec![vec![1, 2, 3], vec![4, 5]]);
        let mut buf = [0u8; 16];
        let wait = Duration::from_millis(10);

        assert_eq!(source.recv(&mut buf, wait).await.unwrap(), Received::Datagram(3));
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(source.recv(&mut buf, wait).await.unwrap(), Received::Datagram(2));
        assert_eq!(&buf[..2], &[4, 5]);
        assert!(matches!(
            source.recv(&mut buf, wait).await,
            Err(CamrxError::SourceClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn memory_source_times_out_while_feed_alive() {
        let (feed, mut source) = MemorySource::channel();
        let mut buf = [0u8; 16];

        let got = source.recv(&mut buf, Duration::from_millis(50)).await.unwrap();
        assert_eq!(got, Received::Timeout);

        assert!(feed.push(vec![9]));
        let got = source.recv(&mut buf, Duration::from_millis(50)).await.unwrap();
        assert_eq!(got, Received::Datagram(1));
    }

    #[tokio::test]
    async fn memory_source_truncates() {
        let mut source = MemorySource::from_datagrams(vec![vec![1, 2, 3, 4, 5, 6]]);
        let mut buf = [0u8; 4];
        let got = source.recv(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(got, Received::Datagram(4));
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn closed_feed_ends_source() {
        let (mut feed, mut source) = MemorySource::channel();
        feed.close();
        assert!(!feed.push(vec![1]));
        let mut buf = [0u8; 4];
        let res = source.recv(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(res, Err(CamrxError::SourceClosed)));
    }

    #[tokio::test]
    async fn udp_source_receives_and_times_out() {
        let mut source = UdpSource::bind(0).await.unwrap();
        let port = source.local_addr().unwrap().port();
        let mut buf = [0u8; 64];

        let got = source.recv(&mut buf, Duration::from_millis(20)).await.unwrap();
        assert_eq!(got, Received::Timeout);

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"ping", ("127.0.0.1", port)).await.unwrap();

        let got = source.recv(&mut buf, Duration::from_secs(2)).await.unwrap();
        assert_eq!(got, Received::Datagram(4));
        assert_eq!(&buf[..4], b"ping");
    }
}
