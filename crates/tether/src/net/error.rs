use std::io;
use std::time::Duration;

use super::protocol::ProtocolError;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("could not resolve {target}: {reason}")]
    ResolutionFailure { target: String, reason: String },
    #[error("could not connect to {target}: {source}")]
    ConnectFailure {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("handshake checksum mismatch (own {expected:#06X}, received {received:#06X})")]
    ChecksumMismatch { expected: u16, received: u16 },
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("connection closed by remote peer")]
    RemoteClosed,
    #[error("client has been shut down")]
    ClientClosed,
    #[error("host has been shut down")]
    HostClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Resolution,
    Connect,
    ChecksumMismatch,
    Io,
    ProtocolViolation,
    Timeout,
    Closed,
}

impl NetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NetError::ResolutionFailure { .. } => ErrorKind::Resolution,
            NetError::ConnectFailure { .. } => ErrorKind::Connect,
            NetError::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            NetError::Io(_) => ErrorKind::Io,
            NetError::Protocol(_) => ErrorKind::ProtocolViolation,
            NetError::Timeout { .. } => ErrorKind::Timeout,
            NetError::RemoteClosed | NetError::ClientClosed | NetError::HostClosed => {
                ErrorKind::Closed
            }
        }
    }
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Resolution => "resolution failure",
            ErrorKind::Connect => "connect failure",
            ErrorKind::ChecksumMismatch => "checksum mismatch",
            ErrorKind::Io => "i/o error",
            ErrorKind::ProtocolViolation => "protocol violation",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Closed => "closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = NetError::ChecksumMismatch {
            expected: 0xBB3D,
            received: 0xBB3C,
        };
        assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
        assert!(err.to_string().contains("0xBB3D"));

        let err: NetError = ProtocolError::ShortDatagram { len: 1 }.into();
        assert_eq!(err.kind(), ErrorKind::ProtocolViolation);

        let err: NetError = io::Error::from(io::ErrorKind::BrokenPipe).into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
