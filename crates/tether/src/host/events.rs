use std::net::SocketAddr;

use crate::net::{ErrorKind, PeerId};
use crate::session::Channel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    PeerConnected {
        peer_id: PeerId,
        addr: SocketAddr,
    },
    PeerDisconnected {
        peer_id: PeerId,
        reason: LeaveReason,
    },
    ConnectionDenied {
        addr: SocketAddr,
        reason: String,
    },
    DatagramBound {
        peer_id: PeerId,
        addr: SocketAddr,
    },
    ClockSyncRequested {
        peer_id: PeerId,
    },
    DataReceived {
        peer_id: PeerId,
        channel: Channel,
        payload: Vec<u8>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    Graceful,
    Kicked,
    Failed(ErrorKind),
}

impl LeaveReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveReason::Graceful => "disconnected",
            LeaveReason::Kicked => "kicked",
            LeaveReason::Failed(kind) => kind.as_str(),
        }
    }
}

#[derive(Debug)]
pub(crate) enum HostCommand {
    Send { peer_id: PeerId, payload: Vec<u8> },
    SendUnreliable { peer_id: PeerId, payload: Vec<u8> },
    Kick { peer_id: PeerId },
    Shutdown,
}
