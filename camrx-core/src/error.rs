//! Domain-specific error types for the camrx receiver.
//!
//! Fallible operations return `Result<T, CamrxError>`. Nothing on the
//! receive path panics on malformed input: bad datagrams are dropped and
//! socket failures end the receive task without reaching the consumer.

use thiserror::Error;

/// The canonical error type for camrx.
#[derive(Debug, Error)]
pub enum CamrxError {
    // ── Wire Errors ──────────────────────────────────────────────
    /// A read of `width` bytes at `offset` ran past the end of the buffer.
    #[error("read of {width} bytes at offset {offset} exceeds buffer of {len} bytes")]
    OutOfRange {
        offset: usize,
        width: usize,
        len: usize,
    },

    // ── Source Errors ────────────────────────────────────────────
    /// The socket layer reported an error.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// The datagram source was closed, usually by shutdown.
    #[error("datagram source closed")]
    SourceClosed,

    // ── Application Errors ───────────────────────────────────────
    /// Receiver or consumer configuration was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A frame or pose sink failed to accept a value.
    #[error("sink error: {0}")]
    Sink(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for CamrxError {
    fn from(s: String) -> Self {
        CamrxError::Other(s)
    }
}

impl From<&str> for CamrxError {
    fn from(s: &str) -> Self {
        CamrxError::Other(s.to_string())
    }
}
