use std::fmt;

use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize, rancor};

use super::checksum::crc16;

pub const DEFAULT_PORT: u16 = 27015;
pub const MAX_DATAGRAM_SIZE: usize = 1200;
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

pub const HANDSHAKE_SIZE: usize = 6;
pub const DATAGRAM_HEADER_SIZE: usize = 4;
pub const FRAME_HEADER_SIZE: usize = 4;

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

impl PeerId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("short handshake record ({len} of 6 bytes)")]
    ShortHandshake { len: usize },
    #[error("short datagram ({len} bytes, header needs 4)")]
    ShortDatagram { len: usize },
    #[error("datagram of {size} bytes exceeds maximum of {max}")]
    DatagramTooLarge { size: usize, max: usize },
    #[error("stream frame of {size} bytes exceeds maximum of {max}")]
    FrameTooLarge { size: usize, max: usize },
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
}

/// Identity record written by the accepting side right after the stream
/// connects. The checksum covers the wire bytes of `peer_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeRecord {
    pub peer_id: PeerId,
    pub checksum: u16,
}

impl HandshakeRecord {
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            checksum: handshake_checksum(peer_id),
        }
    }

    pub fn encode(&self) -> [u8; HANDSHAKE_SIZE] {
        let mut bytes = [0u8; HANDSHAKE_SIZE];
        bytes[..4].copy_from_slice(&self.peer_id.0.to_be_bytes());
        bytes[4..].copy_from_slice(&self.checksum.to_be_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HANDSHAKE_SIZE {
            return Err(ProtocolError::ShortHandshake { len: bytes.len() });
        }

        let peer_id = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let checksum = u16::from_be_bytes([bytes[4], bytes[5]]);

        Ok(Self {
            peer_id: PeerId(peer_id),
            checksum,
        })
    }

    pub fn expected_checksum(&self) -> u16 {
        handshake_checksum(self.peer_id)
    }

    pub fn is_valid(&self) -> bool {
        self.checksum == self.expected_checksum()
    }
}

pub fn handshake_checksum(peer_id: PeerId) -> u16 {
    crc16(&peer_id.0.to_be_bytes())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramHeader {
    pub sequence: u32,
}

impl DatagramHeader {
    pub fn new(sequence: u32) -> Self {
        Self { sequence }
    }

    pub fn encode(&self) -> [u8; DATAGRAM_HEADER_SIZE] {
        self.sequence.to_be_bytes()
    }
}

pub fn encode_datagram(
    sequence: u32,
    payload: &[u8],
    max_size: usize,
) -> Result<Vec<u8>, ProtocolError> {
    let size = DATAGRAM_HEADER_SIZE + payload.len();
    if size > max_size {
        return Err(ProtocolError::DatagramTooLarge {
            size,
            max: max_size,
        });
    }

    let mut datagram = Vec::with_capacity(size);
    datagram.extend_from_slice(&DatagramHeader::new(sequence).encode());
    datagram.extend_from_slice(payload);
    Ok(datagram)
}

pub fn decode_datagram(
    datagram: &[u8],
    max_size: usize,
) -> Result<(DatagramHeader, &[u8]), ProtocolError> {
    if datagram.len() > max_size {
        return Err(ProtocolError::DatagramTooLarge {
            size: datagram.len(),
            max: max_size,
        });
    }
    if datagram.len() < DATAGRAM_HEADER_SIZE {
        return Err(ProtocolError::ShortDatagram {
            len: datagram.len(),
        });
    }

    let (header, payload) = datagram.split_at(DATAGRAM_HEADER_SIZE);
    let sequence = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    Ok((DatagramHeader::new(sequence), payload))
}

/// Half-range modular comparison: `s1` is newer than `s2` even across a wrap.
#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum StreamMessage {
    BindDatagram {
        port: u16,
    },
    TimesyncRequest {
        client_time_ms: u64,
    },
    TimesyncResponse {
        client_time_ms: u64,
        server_time_ms: u64,
    },
    Data(Vec<u8>),
}

impl StreamMessage {
    pub fn serialize(&self) -> Result<Vec<u8>, ProtocolError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(ProtocolError::Serialize)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut aligned = AlignedVec::<16>::with_capacity(data.len());
        aligned.extend_from_slice(data);
        rkyv::from_bytes::<Self, rancor::Error>(&aligned).map_err(ProtocolError::Deserialize)
    }
}

/// Length-prefixed frame for the reliable stream.
pub fn encode_frame(message: &StreamMessage, max_size: usize) -> Result<Vec<u8>, ProtocolError> {
    let body = message.serialize()?;
    if body.len() > max_size {
        return Err(ProtocolError::FrameTooLarge {
            size: body.len(),
            max: max_size,
        });
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

pub fn frame_length(
    header: [u8; FRAME_HEADER_SIZE],
    max_size: usize,
) -> Result<usize, ProtocolError> {
    let size = u32::from_be_bytes(header) as usize;
    if size > max_size {
        return Err(ProtocolError::FrameTooLarge {
            size,
            max: max_size,
        });
    }
    Ok(size)
}

pub fn decode_frame(body: &[u8]) -> Result<StreamMessage, ProtocolError> {
    StreamMessage::deserialize(body)
}
