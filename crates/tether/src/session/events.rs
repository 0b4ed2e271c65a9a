use std::fmt;

use tokio::sync::oneshot;

use crate::net::{ClockSample, ErrorKind, PeerId};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: String,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Reliable,
    Unreliable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Requested,
    Shutdown,
    Failed(ErrorKind),
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Requested => "disconnected",
            DisconnectReason::Shutdown => "shut down",
            DisconnectReason::Failed(kind) => kind.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Connected {
        peer_id: PeerId,
    },
    /// `peer_id` is `None` when the session ended before the handshake.
    Disconnected {
        peer_id: Option<PeerId>,
        reason: DisconnectReason,
    },
    DataReceived {
        peer_id: PeerId,
        channel: Channel,
        payload: Vec<u8>,
    },
    ClockSample {
        peer_id: PeerId,
        sample: ClockSample,
    },
}

#[derive(Debug)]
pub(crate) enum Command {
    Connect(Endpoint),
    Disconnect { done: oneshot::Sender<()> },
    Shutdown,
    Send(Vec<u8>),
    SendUnreliable(Vec<u8>),
}
