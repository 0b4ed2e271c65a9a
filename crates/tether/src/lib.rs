pub mod event;
pub mod host;
pub mod net;
pub mod session;

pub use event::EventBus;
pub use host::{Host, HostConfig, HostEvent, LeaveReason, RoutingTable};
pub use net::{
    AdmissionPolicy, ChannelStats, ClockSample, DEFAULT_PORT, ErrorKind, HandshakeRecord,
    HandshakeState, MAX_DATAGRAM_SIZE, MAX_FRAME_SIZE, NetError, PeerId, ProtocolError,
    StreamMessage,
};
pub use session::{
    Channel, Client, ClientConfig, ClientEvent, DisconnectReason, Endpoint, SessionState,
};
