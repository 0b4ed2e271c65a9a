use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::NetError;
use super::protocol::{HANDSHAKE_SIZE, HandshakeRecord, PeerId, ProtocolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Connecting,
    AwaitingRecord,
    Validating,
    Established,
    Rejected,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Connecting side of the handshake: reads exactly one record and validates
/// its checksum. A mismatch shuts the stream down; it is never retried.
#[derive(Debug)]
pub struct Handshake {
    state: HandshakeState,
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

impl Handshake {
    pub fn new() -> Self {
        Self {
            state: HandshakeState::Connecting,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub async fn run<S>(&mut self, stream: &mut S) -> Result<PeerId, NetError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.transition(HandshakeState::AwaitingRecord);

        let mut buffer = [0u8; HANDSHAKE_SIZE];
        let mut filled = 0;
        while filled < HANDSHAKE_SIZE {
            match stream.read(&mut buffer[filled..]).await {
                Ok(0) => {
                    self.transition(HandshakeState::Rejected);
                    return Err(ProtocolError::ShortHandshake { len: filled }.into());
                }
                Ok(n) => filled += n,
                Err(e) => {
                    self.transition(HandshakeState::Rejected);
                    return Err(e.into());
                }
            }
        }

        self.transition(HandshakeState::Validating);
        let record = HandshakeRecord::decode(&buffer)?;
        let expected = record.expected_checksum();

        if record.checksum != expected {
            log::warn!(
                "Got bad peer id {} (own CRC: {:04X}, received CRC: {:04X}), disconnecting peer",
                record.peer_id,
                expected,
                record.checksum
            );
            self.transition(HandshakeState::Rejected);
            let _ = stream.shutdown().await;
            return Err(NetError::ChecksumMismatch {
                expected,
                received: record.checksum,
            });
        }

        self.transition(HandshakeState::Established);
        log::debug!("Received peer id {}", record.peer_id);
        Ok(record.peer_id)
    }

    fn transition(&mut self, next: HandshakeState) {
        log::trace!("Handshake {} -> {}", self.state, next);
        self.state = next;
    }
}

/// Accepting side: assigns the identity.
pub async fn write_record<S>(stream: &mut S, peer_id: PeerId) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream
        .write_all(&HandshakeRecord::new(peer_id).encode())
        .await?;
    stream.flush().await
}
