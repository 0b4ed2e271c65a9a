mod channel;
mod checksum;
mod clock;
mod endpoint;
mod error;
mod handshake;
mod protocol;
mod stats;
mod timesync;
mod tracking;

pub use channel::{DatagramInput, UnreliableChannel};
pub use checksum::crc16;
pub use clock::{ClockSample, StopWatch};
pub use endpoint::{StreamEndpoint, StreamInput, connect, resolve};
pub use error::{ErrorKind, NetError};
pub use handshake::{Handshake, HandshakeState, write_record};
pub use protocol::{
    DATAGRAM_HEADER_SIZE, DEFAULT_PORT, DatagramHeader, FRAME_HEADER_SIZE, HANDSHAKE_SIZE,
    HandshakeRecord, MAX_DATAGRAM_SIZE, MAX_FRAME_SIZE, PeerId, ProtocolError, StreamMessage,
    decode_datagram, decode_frame, encode_datagram, encode_frame, frame_length,
    handshake_checksum, sequence_greater_than,
};
pub use stats::ChannelStats;
pub use timesync::TimeSyncLoop;
pub use tracking::{AdmissionPolicy, SequenceTable, SequenceTracker};
