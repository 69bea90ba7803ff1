//! Error types for PBus.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Result type alias for PBus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for PBus.
#[derive(Error, Debug)]
pub enum Error {
    /// Operation attempted while disconnected. Local, never network-caused.
    #[error("not connected")]
    NotConnected,

    /// No correlating reply arrived within the caller's deadline. The pending
    /// entry has already been cleaned up; retrying uses a fresh tag.
    #[error("request timed out")]
    Timeout,

    /// The connection was torn down while this request was still pending.
    #[error("request cancelled by disconnect")]
    Cancelled,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Frame parsing and payload decoding errors.
///
/// These arise only from [`crate::protocol::parse_response`] and the value
/// helpers. A malformed datagram on the receive path that belongs to no
/// pending request is logged and dropped, never surfaced as one of these.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("frame too short: {len} bytes")]
    FrameTooShort { len: usize },

    #[error("invalid start delimiter: expected 0x02, got {got:#04x}")]
    InvalidStx { got: u8 },

    #[error("invalid end delimiter: expected 0x03, got {got:#04x}")]
    InvalidEtx { got: u8 },

    #[error("CRC mismatch: received {received:#06x}, computed {computed:#06x}")]
    ChecksumMismatch { received: u16, computed: u16 },

    #[error("invalid magic number")]
    InvalidMagic,

    #[error("invalid protocol id: {got:#06x}")]
    InvalidProtocolId { got: u16 },

    #[error("truncated response record")]
    TruncatedResponse,

    #[error("response payload extends beyond frame")]
    PayloadOverrun,

    #[error("value length mismatch: expected {expected} bytes, got {got}")]
    ValueLength { expected: usize, got: usize },
}

/// Transport layer errors.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("bind failed on {addr}: {reason}")]
    BindFailed { addr: SocketAddr, reason: String },

    #[error("connect failed to {addr}: {reason}")]
    ConnectFailed { addr: SocketAddr, reason: String },

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("socket error: {0}")]
    SocketError(String),
}

impl Error {
    /// Check if error is recoverable (caller may retry with a fresh request).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Timeout
                | Error::Transport(
                    TransportError::SendFailed(_) | TransportError::ReceiveFailed(_)
                )
                | Error::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_recoverable() {
        assert!(Error::Timeout.is_recoverable());
        assert!(!Error::NotConnected.is_recoverable());
        assert!(!Error::Cancelled.is_recoverable());
    }

    #[test]
    fn test_protocol_error_display() {
        let err = Error::Protocol(ProtocolError::ChecksumMismatch {
            received: 0x1234,
            computed: 0xabcd,
        });
        let msg = err.to_string();
        assert!(msg.contains("0x1234"));
        assert!(msg.contains("0xabcd"));
    }
}
